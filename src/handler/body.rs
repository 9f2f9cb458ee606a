//! POST body decoding
//!
//! JSON payloads, urlencoded forms and multipart forms. Multipart file fields
//! become uploads, or blob references when the platform stored the file
//! already and only sent its description.

use futures::stream;
use hyper::body::Bytes;
use serde_json::Value;
use thiserror::Error;

use super::args::{decode_component_bytes, Arg, BlobInfo, Upload};

pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
pub const MULTIPART_FORM: &str = "multipart/form-data";

#[derive(Debug, Error)]
pub enum BodyError {
    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("field {field:?} is not valid {charset}")]
    Encoding { field: String, charset: &'static str },
    #[error("invalid multipart body: {0}")]
    Multipart(#[from] multer::Error),
    #[error("invalid blob info: {0}")]
    BlobInfo(String),
}

/// Text encoding applied to form fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Charset {
    #[default]
    Utf8,
    Latin1,
    Ascii,
}

impl Charset {
    /// Look up a charset by its common label
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Some(Self::Utf8),
            "latin-1" | "latin1" | "iso-8859-1" | "iso8859-1" => Some(Self::Latin1),
            "ascii" | "us-ascii" => Some(Self::Ascii),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Latin1 => "latin-1",
            Self::Ascii => "ascii",
        }
    }

    /// Strict decode; `None` when the bytes are not valid in this charset
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            Self::Utf8 => std::str::from_utf8(bytes).ok().map(ToString::to_string),
            Self::Latin1 => Some(bytes.iter().map(|&b| char::from(b)).collect()),
            Self::Ascii => bytes
                .is_ascii()
                .then(|| bytes.iter().map(|&b| char::from(b)).collect()),
        }
    }

    fn decode_field(self, field: &str, bytes: &[u8]) -> Result<String, BodyError> {
        self.decode(bytes).ok_or_else(|| BodyError::Encoding {
            field: field.to_string(),
            charset: self.label(),
        })
    }
}

pub fn parse_json(body: &[u8]) -> Result<Value, BodyError> {
    Ok(serde_json::from_slice(body)?)
}

/// Decode a form body; blank values are kept as empty text
pub async fn parse_form(
    body: Bytes,
    content_type: &str,
    raw_content_type: Option<&str>,
    charset: Charset,
    blob: bool,
) -> Result<Vec<(String, Arg)>, BodyError> {
    if content_type == MULTIPART_FORM {
        parse_multipart(body, raw_content_type.unwrap_or_default(), charset, blob).await
    } else {
        parse_urlencoded(&body, charset)
    }
}

/// Split and percent-decode on raw bytes; text is decoded with `charset`
/// only afterwards
pub fn parse_urlencoded(body: &[u8], charset: Charset) -> Result<Vec<(String, Arg)>, BodyError> {
    body.split(|&b| b == b'&' || b == b';')
        .filter(|p| !p.is_empty())
        .map(|part| {
            let (key, value) = match part.iter().position(|&b| b == b'=') {
                Some(eq) => (&part[..eq], &part[eq + 1..]),
                None => (part, &[][..]),
            };
            let key_bytes = decode_component_bytes(key);
            let key = charset.decode_field(&String::from_utf8_lossy(&key_bytes), &key_bytes)?;
            let value = charset.decode_field(&key, &decode_component_bytes(value))?;
            Ok((key, Arg::Text(value)))
        })
        .collect()
}

async fn parse_multipart(
    body: Bytes,
    raw_content_type: &str,
    charset: Charset,
    blob: bool,
) -> Result<Vec<(String, Arg)>, BodyError> {
    let boundary = multer::parse_boundary(raw_content_type)?;
    let body_stream = stream::once(async move { Ok::<Bytes, std::io::Error>(body) });
    let mut multipart = multer::Multipart::new(body_stream, boundary);

    let mut fields = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        let filename = field.file_name().map(ToString::to_string);
        let part_type = field
            .headers()
            .get(hyper::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        let data = field.bytes().await?;

        let value = match filename {
            Some(filename) if blob => {
                Arg::Blob(parse_blob_info(&filename, part_type.as_deref(), &data)?)
            }
            Some(filename) => Arg::File(Upload {
                name: name.clone(),
                filename,
                content_type: part_type,
                data,
            }),
            None => Arg::Text(charset.decode_field(&name, &data)?),
        };
        fields.push((name, value));
    }
    Ok(fields)
}

/// Parse the description of a platform-stored upload: the part's content
/// type carries the `blob-key`, its body a header block describing the file
pub fn parse_blob_info(
    filename: &str,
    part_type: Option<&str>,
    data: &[u8],
) -> Result<BlobInfo, BodyError> {
    let part_type = part_type.ok_or_else(|| BodyError::BlobInfo("missing content type".into()))?;
    let blob_key = header_param(part_type, "blob-key")
        .ok_or_else(|| BodyError::BlobInfo("missing blob-key".into()))?;

    let text = String::from_utf8_lossy(data);
    let mut content_type = None;
    let mut size = None;
    let mut md5_hash = None;
    let mut creation = None;
    for line in text.lines().take_while(|l| !l.trim().is_empty()) {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().to_string();
        match name.trim().to_ascii_lowercase().as_str() {
            "content-type" => content_type = Some(value),
            "content-length" => {
                size = Some(value.parse::<u64>().map_err(|_| {
                    BodyError::BlobInfo(format!("invalid content-length {value:?}"))
                })?);
            }
            "content-md5" => md5_hash = Some(value),
            "x-appengine-upload-creation" => creation = Some(value),
            _ => {}
        }
    }

    Ok(BlobInfo {
        blob_key,
        content_type: content_type
            .ok_or_else(|| BodyError::BlobInfo("missing content-type".into()))?,
        filename: filename.to_string(),
        size: size.ok_or_else(|| BodyError::BlobInfo("missing content-length".into()))?,
        md5_hash,
        creation,
    })
}

/// Value of a `; name=value` parameter in a header, quotes removed
fn header_param(header: &str, name: &str) -> Option<String> {
    header.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| value.trim().trim_matches('"').to_string())
    })
}
