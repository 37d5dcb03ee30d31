use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Headers above this size are treated as corrupt
pub const MAX_HEADER_LEN: u64 = 100 * 1024 * 1024;

/// Key under which safetensors keeps free-form string metadata
const METADATA_KEY: &str = "__metadata__";

pub struct SafetensorsReader {
    /// Path to the safetensors file
    pub path: PathBuf,
    /// `__metadata__` entries; training tools store JSON documents as strings here
    pub metadata: BTreeMap<String, String>,
}

impl SafetensorsReader {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path)?;

        let header_len = read_header_len(&mut file)?;
        if header_len == 0 || header_len > MAX_HEADER_LEN {
            return Err(Error::InvalidFormat(format!(
                "{}: implausible header length {}",
                path.display(),
                header_len
            )));
        }

        let mut header = vec![0u8; header_len as usize];
        file.read_exact(&mut header)?;

        let header: Value = serde_json::from_slice(&header).map_err(|e| {
            Error::InvalidFormat(format!("{}: header is not JSON: {}", path.display(), e))
        })?;
        let Value::Object(entries) = header else {
            return Err(Error::InvalidFormat(format!(
                "{}: header is not a JSON object",
                path.display()
            )));
        };

        let mut metadata = BTreeMap::new();
        let mut tensor_count = 0;
        for (key, value) in entries {
            if key == METADATA_KEY {
                if let Value::Object(fields) = value {
                    for (name, field) in fields {
                        match field {
                            Value::String(s) => {
                                metadata.insert(name, s);
                            }
                            other => {
                                metadata.insert(name, other.to_string());
                            }
                        }
                    }
                }
            } else {
                tensor_count += 1;
            }
        }

        debug!(
            "Read safetensors header of {}: {} tensors, {} metadata entries",
            path.display(),
            tensor_count,
            metadata.len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            metadata,
        })
    }

    pub fn get_metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// A metadata entry whose string value holds a JSON document
    pub fn get_metadata_json(&self, key: &str) -> Option<Value> {
        let raw = self.get_metadata_value(key)?;
        match serde_json::from_str(raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Metadata entry {} of {} is not valid JSON: {}", key, self.path.display(), e);
                None
            }
        }
    }
}

/// Reads the little-endian u64 header length that opens every safetensors file
pub fn read_header_len<R: Read>(reader: &mut R) -> Result<u64> {
    Ok(reader.read_u64::<LittleEndian>()?)
}

/// Check if a file has the safetensors extension and a plausible header
pub fn is_safetensors_file(path: &Path) -> bool {
    let has_ext = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("safetensors"))
        .unwrap_or(false);
    if !has_ext {
        return false;
    }

    let Ok(mut file) = File::open(path) else {
        return false;
    };
    let Ok(header_len) = read_header_len(&mut file) else {
        return false;
    };
    if header_len == 0 || header_len > MAX_HEADER_LEN {
        return false;
    }

    let mut first = [0u8; 1];
    file.read_exact(&mut first).is_ok() && first[0] == b'{'
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_safetensors(path: &Path, header: &str, body: &[u8]) {
        let mut file = File::create(path).unwrap();
        file.write_all(&(header.len() as u64).to_le_bytes()).unwrap();
        file.write_all(header.as_bytes()).unwrap();
        file.write_all(body).unwrap();
    }

    #[test]
    fn reads_training_metadata() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.safetensors");
        write_safetensors(
            &path,
            r#"{"__metadata__":{"ss_tag_frequency":"{\"1_cat\":{\"cat\":3}}"},"w":{"dtype":"F32","shape":[1],"data_offsets":[0,4]}}"#,
            &[0, 0, 0, 0],
        );

        let reader = SafetensorsReader::new(&path).unwrap();
        assert_eq!(reader.metadata.len(), 1);
        let freq = reader.get_metadata_json("ss_tag_frequency").unwrap();
        assert_eq!(freq["1_cat"]["cat"], 3);
        assert!(is_safetensors_file(&path));
    }

    #[test]
    fn rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("b.safetensors");
        std::fs::write(&path, b"not a model").unwrap();
        assert!(SafetensorsReader::new(&path).is_err());
        assert!(!is_safetensors_file(&path));
    }
}
