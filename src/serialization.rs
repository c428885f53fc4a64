use std::{
    ffi::OsStr,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use crate::{
    error::{BoxError, VcrError, VcrResult},
    interaction::CassetteData,
};

/// On-disk representation of a cassette, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CassetteFormat {
    #[cfg(feature = "json")]
    Json,
    #[cfg(feature = "yaml")]
    Yaml,
}
impl CassetteFormat {
    /// `.json` is JSON, anything else is YAML.
    pub fn from_path<P: AsRef<Path>>(path: P) -> VcrResult<Self> {
        match path.as_ref().extension().and_then(OsStr::to_str) {
            #[cfg(feature = "json")]
            Some("json") => Ok(Self::Json),
            #[cfg(feature = "yaml")]
            _ => Ok(Self::Yaml),
            #[cfg(not(feature = "yaml"))]
            ext => Err(VcrError::serialization(
                format!("cannot store a cassette as {}", path.as_ref().display()),
                format!("unsupported cassette extension {:?}", ext),
            )),
        }
    }

    pub fn deserialize(&self, content: &str) -> Result<CassetteData, BoxError> {
        if content.trim().is_empty() {
            return Ok(CassetteData::default());
        }
        match *self {
            #[cfg(feature = "json")]
            Self::Json => Ok(serde_json::from_str(content)?),
            #[cfg(feature = "yaml")]
            Self::Yaml => Ok(serde_yaml::from_str(content)?),
        }
    }

    pub fn serialize(&self, data: &CassetteData) -> Result<String, BoxError> {
        match *self {
            #[cfg(feature = "json")]
            Self::Json => Ok(serde_json::to_string_pretty(data)?),
            #[cfg(feature = "yaml")]
            Self::Yaml => Ok(serde_yaml::to_string(data)?),
        }
    }
}

pub struct CassetteSerializer;
impl CassetteSerializer {
    pub fn load<P: AsRef<Path>>(path: P) -> VcrResult<CassetteData> {
        let path = path.as_ref();
        let format = CassetteFormat::from_path(path)?;
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(VcrError::CassetteNotFound { path: path.to_path_buf() })
            }
            Err(e) => return Err(VcrError::serialization(format!("failed to read cassette {}", path.display()), e)),
        };
        format
            .deserialize(&content)
            .map_err(|e| VcrError::serialization(format!("failed to parse cassette {}", path.display()), e))
    }

    pub fn save<P: AsRef<Path>>(path: P, data: &CassetteData) -> VcrResult<()> {
        let path = path.as_ref();
        let content = CassetteFormat::from_path(path)?
            .serialize(data)
            .map_err(|e| VcrError::serialization(format!("failed to serialize cassette {}", path.display()), e))?;
        let write_err =
            |source: std::io::Error| VcrError::CassetteWrite { path: PathBuf::from(path), source: source.into() };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(path, content).map_err(write_err)
    }
}

pub(crate) mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use bytes::Bytes;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map(Bytes::from).map_err(D::Error::custom)
    }
}

pub(crate) mod base64_messages {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use bytes::Bytes;
    use serde::{de::Error, ser::SerializeSeq, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(messages: &[Bytes], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(messages.len()))?;
        for message in messages {
            seq.serialize_element(&STANDARD.encode(message))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Bytes>, D::Error> {
        Vec::<String>::deserialize(deserializer)?
            .into_iter()
            .map(|encoded| STANDARD.decode(encoded.as_bytes()).map(Bytes::from).map_err(D::Error::custom))
            .collect()
    }
}

/// Status codes as their upper snake case names, e.g. `NOT_FOUND`.
pub(crate) mod code_name {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use tonic::Code;

    const CODES: [(Code, &str); 17] = [
        (Code::Ok, "OK"),
        (Code::Cancelled, "CANCELLED"),
        (Code::Unknown, "UNKNOWN"),
        (Code::InvalidArgument, "INVALID_ARGUMENT"),
        (Code::DeadlineExceeded, "DEADLINE_EXCEEDED"),
        (Code::NotFound, "NOT_FOUND"),
        (Code::AlreadyExists, "ALREADY_EXISTS"),
        (Code::PermissionDenied, "PERMISSION_DENIED"),
        (Code::ResourceExhausted, "RESOURCE_EXHAUSTED"),
        (Code::FailedPrecondition, "FAILED_PRECONDITION"),
        (Code::Aborted, "ABORTED"),
        (Code::OutOfRange, "OUT_OF_RANGE"),
        (Code::Unimplemented, "UNIMPLEMENTED"),
        (Code::Internal, "INTERNAL"),
        (Code::Unavailable, "UNAVAILABLE"),
        (Code::DataLoss, "DATA_LOSS"),
        (Code::Unauthenticated, "UNAUTHENTICATED"),
    ];

    pub fn name(code: Code) -> &'static str {
        CODES.iter().find(|(c, _)| *c == code).map(|(_, name)| *name).unwrap_or("UNKNOWN")
    }

    pub fn from_name(name: &str) -> Option<Code> {
        CODES.iter().find(|(_, n)| n.eq_ignore_ascii_case(name)).map(|(code, _)| *code)
    }

    pub fn serialize<S: Serializer>(code: &Code, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(name(*code))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Code, D::Error> {
        let name = String::deserialize(deserializer)?;
        from_name(&name).ok_or_else(|| D::Error::custom(format!("unknown status code {name:?}")))
    }
}
