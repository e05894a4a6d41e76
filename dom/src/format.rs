//! Text formats for documents and patches.
//!
//! JSON is always available. RON is behind the `serialize-ron` feature.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::FormatError;
use crate::patch::Patch;

/// Supported text formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Json,
    /// RON (Rusty Object Notation).
    #[cfg(feature = "serialize-ron")]
    Ron,
}

impl Format {
    /// Canonical file extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Format::Json => "json",
            #[cfg(feature = "serialize-ron")]
            Format::Ron => "ron",
        }
    }

    /// Picks a format from a file extension. Unknown extensions yield `None`.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "json" | "prefab" => Some(Format::Json),
            #[cfg(feature = "serialize-ron")]
            "ron" => Some(Format::Ron),
            _ => None,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for Format {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Format::from_extension(s).ok_or_else(|| FormatError::Unsupported(s.to_owned()))
    }
}

/// Encode a serde-serializable value as text in the given format.
pub fn encode<T: Serialize + ?Sized>(
    value: &T,
    format: Format,
    pretty: bool,
) -> Result<String, FormatError> {
    match format {
        Format::Json if pretty => Ok(serde_json::to_string_pretty(value)?),
        Format::Json => Ok(serde_json::to_string(value)?),
        #[cfg(feature = "serialize-ron")]
        Format::Ron => {
            let result = if pretty {
                ron::ser::to_string_pretty(value, ron::ser::PrettyConfig::default())
            } else {
                ron::ser::to_string(value)
            };
            result.map_err(|e| FormatError::Ron(e.to_string()))
        }
    }
}

/// Decode text in the given format.
pub fn decode<T: DeserializeOwned>(text: &str, format: Format) -> Result<T, FormatError> {
    match format {
        Format::Json => Ok(serde_json::from_str(text)?),
        #[cfg(feature = "serialize-ron")]
        Format::Ron => ron::from_str(text).map_err(|e| FormatError::Ron(e.to_string())),
    }
}

/// Decode raw bytes, which must be UTF-8 text in the given format.
pub fn decode_bytes<T: DeserializeOwned>(bytes: &[u8], format: Format) -> Result<T, FormatError> {
    let text = std::str::from_utf8(bytes)?;
    decode(text, format)
}

/// Encode a patch as an RFC 6902 operation list.
pub fn encode_patch(patch: &Patch, format: Format, pretty: bool) -> Result<String, FormatError> {
    encode(patch, format, pretty)
}

/// Decode an RFC 6902 operation list.
pub fn decode_patch(text: &str, format: Format) -> Result<Patch, FormatError> {
    decode(text, format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Dom, DomPath, PatchOp};

    fn sample() -> Dom {
        serde_json::from_str(r#"{"Source":"a.prefab","Entities":{"E":{"Name":"n","Id":3}},"List":[1,-2,2.5,null,true]}"#)
            .unwrap()
    }

    #[test]
    fn json_compact_and_pretty() {
        let dom = sample();
        let compact = encode(&dom, Format::Json, false).unwrap();
        assert!(!compact.contains('\n'));
        let pretty = encode(&dom, Format::Json, true).unwrap();
        assert!(pretty.contains('\n'));
        assert_eq!(decode::<Dom>(&pretty, Format::Json).unwrap(), dom);
    }

    #[cfg(feature = "serialize-ron")]
    #[test]
    fn ron_keeps_document() {
        let dom = sample();
        let text = encode(&dom, Format::Ron, true).unwrap();
        assert_eq!(decode::<Dom>(&text, Format::Ron).unwrap(), dom);
    }

    #[test]
    fn patch_encodes_as_op_list() {
        let patch = Patch::from_ops(vec![PatchOp::Remove {
            path: DomPath::from_tokens(["Entities", "E"]),
        }]);
        let text = encode_patch(&patch, Format::Json, false).unwrap();
        assert_eq!(text, r#"[{"op":"remove","path":"/Entities/E"}]"#);
        assert_eq!(decode_patch(&text, Format::Json).unwrap(), patch);
    }

    #[test]
    fn format_from_str() {
        assert_eq!("JSON".parse::<Format>().unwrap(), Format::Json);
        assert!(matches!("yaml".parse::<Format>(), Err(FormatError::Unsupported(_))));
    }

    #[test]
    fn decode_bytes_rejects_invalid_utf8() {
        let err = decode_bytes::<Dom>(&[0xff, 0xfe], Format::Json).unwrap_err();
        assert!(matches!(err, FormatError::Utf8(_)));
    }
}
