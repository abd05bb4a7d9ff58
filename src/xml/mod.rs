//! XML documents exchanged with the storage endpoint.
//!
//! Responses are read with `quick-xml`'s pull reader into explicit typed
//! structs. Elements that may appear once or many times (`Grant`,
//! `Contents`, `CORSRule`) are always collected into a `Vec`, so a single
//! element and a list of them parse to the same shape. Request bodies are
//! full-replace documents built by string assembly with escaping.

use crate::error::ParseError;
use crate::types::AccessPolicy;
use quick_xml::events::Event;
use quick_xml::Reader;

/// Namespace of S3 documents.
pub const S3_NAMESPACE: &str = "http://s3.amazonaws.com/doc/2006-03-01/";

/// Group URI that stands for every (including anonymous) user.
pub const ALL_USERS_URI: &str = "http://acs.amazonaws.com/groups/global/AllUsers";

/// Permission granting read access.
pub const PERMISSION_READ: &str = "READ";

/// Permission granting full control.
pub const PERMISSION_FULL_CONTROL: &str = "FULL_CONTROL";

/// Grantee of an ACL entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grantee {
    /// A canonical user, by ID.
    CanonicalUser {
        /// Canonical user ID.
        id: String,
    },
    /// A predefined group, by URI.
    Group {
        /// Group URI.
        uri: String,
    },
    /// A grantee with neither ID nor URI (e.g. by e-mail address).
    Other,
}

/// One ACL entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    /// Who the grant applies to.
    pub grantee: Grantee,
    /// Permission name (`READ`, `FULL_CONTROL`, ...).
    pub permission: String,
}

/// Parsed `AccessControlPolicy` document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessControlPolicy {
    /// Owner canonical ID, when present.
    pub owner_id: Option<String>,
    /// Grants, in document order.
    pub grants: Vec<Grant>,
}

impl AccessControlPolicy {
    /// Owner ID, or [`ParseError::MissingOwner`] if the document has none.
    pub fn require_owner(&self) -> Result<&str, ParseError> {
        self.owner_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or(ParseError::MissingOwner)
    }

    /// Whether the AllUsers group has read access.
    pub fn is_public(&self) -> bool {
        self.grants.iter().any(|grant| {
            matches!(&grant.grantee, Grantee::Group { uri } if uri == ALL_USERS_URI)
                && (grant.permission == PERMISSION_READ
                    || grant.permission == PERMISSION_FULL_CONTROL)
        })
    }
}

/// One rule of a `CORSConfiguration`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorsRule {
    /// Allowed origins.
    pub allowed_origins: Vec<String>,
    /// Allowed methods.
    pub allowed_methods: Vec<String>,
    /// Allowed request headers.
    pub allowed_headers: Vec<String>,
    /// Preflight cache lifetime.
    pub max_age_seconds: Option<u32>,
}

/// Parsed `CORSConfiguration` document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorsConfiguration {
    /// Rules, in document order.
    pub rules: Vec<CorsRule>,
}

/// One entry of a bucket listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListedObject {
    /// Object key.
    pub key: String,
    /// Last modification time as sent by the server.
    pub last_modified: Option<String>,
    /// Entity tag, quotes included.
    pub e_tag: Option<String>,
    /// Size in bytes.
    pub size: Option<u64>,
}

/// Parsed `ListBucketResult` (ListObjects v1) page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListBucketResult {
    /// Bucket name.
    pub name: Option<String>,
    /// Whether more pages follow.
    pub is_truncated: bool,
    /// Marker to request the next page with, when the server sends one.
    pub next_marker: Option<String>,
    /// Objects on this page.
    pub contents: Vec<ListedObject>,
}

impl ListBucketResult {
    /// Marker for the following page: `NextMarker`, else the last key.
    pub fn continuation_marker(&self) -> Option<&str> {
        if !self.is_truncated {
            return None;
        }
        self.next_marker
            .as_deref()
            .or_else(|| self.contents.last().map(|o| o.key.as_str()))
    }
}

fn xml_error(e: impl std::fmt::Display) -> ParseError {
    ParseError::Xml {
        message: e.to_string(),
    }
}

/// A node reported while walking a document, with the path of local
/// element names leading to it.
enum Node<'a> {
    Open(&'a [String]),
    Text(&'a [String], String),
}

fn walk<F>(xml: &str, mut visit: F) -> Result<(), ParseError>
where
    F: FnMut(Node<'_>),
{
    let mut reader = Reader::from_str(xml);

    let mut path: Vec<String> = Vec::new();
    let mut saw_root = false;
    // Whitespace-only text is layout unless it is the whole content of a leaf.
    let mut blank: Option<String> = None;
    let mut in_leaf = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                path.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                saw_root = true;
                blank = None;
                in_leaf = true;
                visit(Node::Open(&path));
            }
            Ok(Event::Empty(e)) => {
                path.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                saw_root = true;
                blank = None;
                in_leaf = false;
                visit(Node::Open(&path));
                path.pop();
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(xml_error)?.into_owned();
                if text.trim().is_empty() {
                    if in_leaf {
                        blank = Some(text);
                    }
                } else {
                    blank = None;
                    visit(Node::Text(&path, text));
                }
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                blank = None;
                visit(Node::Text(&path, text));
            }
            Ok(Event::End(_)) => {
                if let Some(text) = blank.take() {
                    visit(Node::Text(&path, text));
                }
                in_leaf = false;
                path.pop();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(e)),
            _ => {}
        }
    }

    if !saw_root {
        return Err(ParseError::Xml {
            message: "document has no root element".to_string(),
        });
    }
    if !path.is_empty() {
        return Err(ParseError::Xml {
            message: format!("unclosed element <{}>", path.join("/")),
        });
    }
    Ok(())
}

fn is_path(path: &[String], expected: &[&str]) -> bool {
    path.len() == expected.len() && path.iter().zip(expected).all(|(a, b)| a == b)
}

fn ends_with(path: &[String], suffix: &[&str]) -> bool {
    path.len() >= suffix.len() && is_path(&path[path.len() - suffix.len()..], suffix)
}

/// Parse a GetBucketAcl / GetObjectAcl response.
pub fn parse_access_control_policy(xml: &str) -> Result<AccessControlPolicy, ParseError> {
    #[derive(Default)]
    struct PendingGrant {
        id: Option<String>,
        uri: Option<String>,
        permission: String,
    }

    let mut owner_id = None;
    let mut grants: Vec<PendingGrant> = Vec::new();
    let mut saw_policy = false;

    walk(xml, |node| match node {
        Node::Open(path) => {
            if is_path(path, &["AccessControlPolicy"]) {
                saw_policy = true;
            } else if ends_with(path, &["AccessControlList", "Grant"]) {
                grants.push(PendingGrant::default());
            }
        }
        Node::Text(path, text) => {
            if is_path(path, &["AccessControlPolicy", "Owner", "ID"]) {
                owner_id = Some(text);
            } else if let Some(grant) = grants.last_mut() {
                if ends_with(path, &["Grant", "Grantee", "ID"]) {
                    grant.id = Some(text);
                } else if ends_with(path, &["Grant", "Grantee", "URI"]) {
                    grant.uri = Some(text);
                } else if ends_with(path, &["Grant", "Permission"]) {
                    grant.permission = text;
                }
            }
        }
    })?;

    if !saw_policy {
        return Err(ParseError::Xml {
            message: "expected <AccessControlPolicy> root".to_string(),
        });
    }

    let grants = grants
        .into_iter()
        .map(|g| Grant {
            grantee: match (g.id, g.uri) {
                (Some(id), _) => Grantee::CanonicalUser { id },
                (None, Some(uri)) => Grantee::Group { uri },
                (None, None) => Grantee::Other,
            },
            permission: g.permission,
        })
        .collect();

    Ok(AccessControlPolicy { owner_id, grants })
}

/// Parse a GetBucketCors response.
pub fn parse_cors_configuration(xml: &str) -> Result<CorsConfiguration, ParseError> {
    let mut config = CorsConfiguration::default();

    walk(xml, |node| match node {
        Node::Open(path) => {
            if is_path(path, &["CORSConfiguration", "CORSRule"]) {
                config.rules.push(CorsRule::default());
            }
        }
        Node::Text(path, text) => {
            let Some(rule) = config.rules.last_mut() else {
                return;
            };
            match path.last().map(String::as_str) {
                Some("AllowedOrigin") => rule.allowed_origins.push(text),
                Some("AllowedMethod") => rule.allowed_methods.push(text),
                Some("AllowedHeader") => rule.allowed_headers.push(text),
                Some("MaxAgeSeconds") => rule.max_age_seconds = text.trim().parse().ok(),
                _ => {}
            }
        }
    })?;

    Ok(config)
}

/// Parse a ListObjects (v1) response page.
pub fn parse_list_bucket_result(xml: &str) -> Result<ListBucketResult, ParseError> {
    let mut result = ListBucketResult::default();
    let mut saw_result = false;

    walk(xml, |node| match node {
        Node::Open(path) => {
            if is_path(path, &["ListBucketResult"]) {
                saw_result = true;
            } else if is_path(path, &["ListBucketResult", "Contents"]) {
                result.contents.push(ListedObject::default());
            }
        }
        Node::Text(path, text) => {
            if path.len() == 2 && path[0] == "ListBucketResult" {
                match path[1].as_str() {
                    "Name" => result.name = Some(text),
                    "IsTruncated" => {
                        result.is_truncated = text.trim().eq_ignore_ascii_case("true")
                    }
                    "NextMarker" => result.next_marker = Some(text),
                    _ => {}
                }
            } else if path.len() == 3 && ends_with(&path[..2], &["ListBucketResult", "Contents"])
            {
                if let Some(object) = result.contents.last_mut() {
                    match path[2].as_str() {
                        "Key" => object.key = text,
                        "LastModified" => object.last_modified = Some(text),
                        "ETag" => object.e_tag = Some(text),
                        "Size" => object.size = text.trim().parse().ok(),
                        _ => {}
                    }
                }
            }
        }
    })?;

    if !saw_result {
        return Err(ParseError::Xml {
            message: "expected <ListBucketResult> root".to_string(),
        });
    }

    Ok(result)
}

/// Build a full-replace ACL document for `owner_id`.
///
/// The owner always keeps `FULL_CONTROL`; a public policy adds `READ` for
/// the AllUsers group. Replaying the same document never compounds grants.
pub fn build_access_control_policy_xml(owner_id: &str, policy: AccessPolicy) -> String {
    let owner_id = escape_xml(owner_id);
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str(&format!("<AccessControlPolicy xmlns=\"{}\">", S3_NAMESPACE));
    xml.push_str(&format!("<Owner><ID>{}</ID></Owner>", owner_id));
    xml.push_str("<AccessControlList>");
    xml.push_str(&format!(
        "<Grant><Grantee xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" xsi:type=\"CanonicalUser\"><ID>{}</ID></Grantee><Permission>{}</Permission></Grant>",
        owner_id, PERMISSION_FULL_CONTROL
    ));
    if policy.is_public() {
        xml.push_str(&format!(
            "<Grant><Grantee xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" xsi:type=\"Group\"><URI>{}</URI></Grantee><Permission>{}</Permission></Grant>",
            ALL_USERS_URI, PERMISSION_READ
        ));
    }
    xml.push_str("</AccessControlList></AccessControlPolicy>");
    xml
}

/// Build the CORS document that allows cross-origin GET from anywhere.
pub fn build_public_cors_xml() -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str(&format!("<CORSConfiguration xmlns=\"{}\">", S3_NAMESPACE));
    xml.push_str("<CORSRule>");
    xml.push_str("<AllowedOrigin>*</AllowedOrigin>");
    xml.push_str("<AllowedMethod>GET</AllowedMethod>");
    xml.push_str("<AllowedHeader>*</AllowedHeader>");
    xml.push_str("<MaxAgeSeconds>3000</MaxAgeSeconds>");
    xml.push_str("</CORSRule>");
    xml.push_str("</CORSConfiguration>");
    xml
}

/// Build CreateBucket XML request body.
pub fn build_create_bucket_xml(region: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<CreateBucketConfiguration xmlns="{}">
    <LocationConstraint>{}</LocationConstraint>
</CreateBucketConfiguration>"#,
        S3_NAMESPACE,
        escape_xml(region)
    )
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
