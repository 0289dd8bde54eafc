//! Log record model.

use crate::error::{CodecError, CodecResult};

/// A single mutation recorded in the append-only log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Insert or replace a key.
    Set {
        /// Key bytes.
        key: Vec<u8>,
        /// Value bytes.
        value: Vec<u8>,
        /// Time to live in whole seconds, relative to the time the log was
        /// written.
        ttl: Option<u64>,
    },
    /// Remove a key.
    Del {
        /// Key bytes.
        key: Vec<u8>,
    },
    /// Remove every key.
    FlushDb,
}

impl Command {
    /// Returns the lowercase command name as written to the log.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Set { .. } => "set",
            Self::Del { .. } => "del",
            Self::FlushDb => "flushdb",
        }
    }

    /// Returns the key this command touches, if any.
    #[must_use]
    pub fn key(&self) -> Option<&[u8]> {
        match self {
            Self::Set { key, .. } | Self::Del { key } => Some(key),
            Self::FlushDb => None,
        }
    }

    /// Builds a command from the bulk strings of one record.
    ///
    /// `set` and `del` are recognized by their first three bytes regardless
    /// of case; `flushdb` must match fully (case-insensitively).
    pub(crate) fn from_parts(mut parts: Vec<Vec<u8>>) -> CodecResult<Self> {
        let name = parts
            .first()
            .ok_or_else(|| CodecError::invalid("empty command"))?;

        if has_prefix(name, b"set") {
            return match parts.len() {
                3 => {
                    let value = parts.pop().unwrap_or_default();
                    let key = parts.pop().unwrap_or_default();
                    Ok(Self::Set {
                        key,
                        value,
                        ttl: None,
                    })
                }
                5 => {
                    if !parts[3].eq_ignore_ascii_case(b"ex") {
                        return Err(CodecError::invalid("expected EX option in SET"));
                    }
                    let ttl = parse_seconds(&parts[4])?;
                    parts.truncate(3);
                    let value = parts.pop().unwrap_or_default();
                    let key = parts.pop().unwrap_or_default();
                    Ok(Self::Set {
                        key,
                        value,
                        ttl: Some(ttl),
                    })
                }
                n => Err(CodecError::invalid(format!(
                    "SET takes 3 or 5 arguments, got {n}"
                ))),
            };
        }

        if has_prefix(name, b"del") {
            if parts.len() != 2 {
                return Err(CodecError::invalid(format!(
                    "DEL takes 2 arguments, got {}",
                    parts.len()
                )));
            }
            let key = parts.pop().unwrap_or_default();
            return Ok(Self::Del { key });
        }

        if name.eq_ignore_ascii_case(b"flushdb") {
            return Ok(Self::FlushDb);
        }

        Err(CodecError::invalid(format!(
            "unknown command {:?}",
            String::from_utf8_lossy(name)
        )))
    }
}

fn has_prefix(name: &[u8], prefix: &[u8]) -> bool {
    name.len() >= prefix.len() && name[..prefix.len()].eq_ignore_ascii_case(prefix)
}

fn parse_seconds(raw: &[u8]) -> CodecResult<u64> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| {
            CodecError::invalid(format!(
                "invalid EX seconds {:?}",
                String::from_utf8_lossy(raw)
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(items: &[&str]) -> Vec<Vec<u8>> {
        items.iter().map(|s| s.as_bytes().to_vec()).collect()
    }

    #[test]
    fn set_is_matched_by_prefix() {
        let cmd = Command::from_parts(parts(&["SETX", "k", "v"])).unwrap();
        assert_eq!(
            cmd,
            Command::Set {
                key: b"k".to_vec(),
                value: b"v".to_vec(),
                ttl: None
            }
        );
    }

    #[test]
    fn set_with_ex() {
        let cmd = Command::from_parts(parts(&["set", "k", "v", "EX", "10"])).unwrap();
        assert_eq!(
            cmd,
            Command::Set {
                key: b"k".to_vec(),
                value: b"v".to_vec(),
                ttl: Some(10)
            }
        );
    }

    #[test]
    fn set_wrong_arity() {
        assert!(Command::from_parts(parts(&["set", "k"])).is_err());
        assert!(Command::from_parts(parts(&["set", "k", "v", "ex"])).is_err());
        assert!(Command::from_parts(parts(&["set", "k", "v", "px", "1"])).is_err());
        assert!(Command::from_parts(parts(&["set", "k", "v", "ex", "-1"])).is_err());
    }

    #[test]
    fn del_and_flushdb() {
        assert_eq!(
            Command::from_parts(parts(&["DEL", "k"])).unwrap(),
            Command::Del { key: b"k".to_vec() }
        );
        assert!(Command::from_parts(parts(&["del"])).is_err());
        assert_eq!(
            Command::from_parts(parts(&["FlushDB"])).unwrap(),
            Command::FlushDb
        );
    }

    #[test]
    fn unknown_and_short_names() {
        assert!(Command::from_parts(parts(&["get", "k"])).is_err());
        assert!(Command::from_parts(parts(&["se"])).is_err());
        assert!(Command::from_parts(parts(&["flush"])).is_err());
    }
}
