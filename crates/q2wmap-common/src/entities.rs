// entities.rs — entity key/value pairs stored in the entities lump
//
//   {
//   "classname" "worldspawn"
//   "message" "The Edge"
//   }
//
// Entity 0 is worldspawn and carries map-global keys.

use crate::error::{CapacityError, FormatError, Result};
use crate::q_shared::{Vec3, VEC3_ORIGIN};
use crate::qfiles::{MAX_KEY, MAX_MAP_ENTITIES, MAX_MAP_ENTSTRING, MAX_VALUE};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EPair {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entity {
    /// Pairs in file order.
    pub epairs: Vec<EPair>,
}

fn strip_trailing(s: &str) -> &str {
    s.trim_end_matches(|c: char| c <= ' ')
}

/// Length of the leading run of ASCII digits.
fn digits(s: &[u8]) -> usize {
    s.iter().take_while(|c| c.is_ascii_digit()).count()
}

/// Leading float of `s` after whitespace, ignoring trailing garbage.
/// 0.0 if there is none.
fn parse_float_prefix(s: &str) -> f32 {
    let s = s.trim_start();
    let b = s.as_bytes();
    let mut end = usize::from(matches!(b.first(), Some(b'+' | b'-')));
    let int = digits(&b[end..]);
    end += int;
    let mut frac = 0;
    if b.get(end) == Some(&b'.') {
        frac = digits(&b[end + 1..]);
        end += 1 + frac;
    }
    if int + frac == 0 {
        return 0.0;
    }
    if matches!(b.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        exp += usize::from(matches!(b.get(exp), Some(b'+' | b'-')));
        let n = digits(&b[exp..]);
        if n > 0 {
            end = exp + n;
        }
    }
    s[..end].parse().unwrap_or(0.0)
}

/// Leading integer of `s` after whitespace, ignoring trailing garbage.
/// 0 if there is none.
fn parse_int_prefix(s: &str) -> i32 {
    let s = s.trim_start();
    let b = s.as_bytes();
    let sign = usize::from(matches!(b.first(), Some(b'+' | b'-')));
    let n = digits(&b[sign..]);
    if n == 0 {
        return 0;
    }
    s[..sign + n].parse().unwrap_or(0)
}

impl Entity {
    /// Value for `key`, or "" if not present. With duplicate keys the last
    /// one in the file wins.
    pub fn value_for_key(&self, key: &str) -> &str {
        self.epairs
            .iter()
            .rev()
            .find(|ep| ep.key == key)
            .map(|ep| ep.value.as_str())
            .unwrap_or("")
    }

    /// Replace the value of `key` (its last occurrence), or append a new pair.
    pub fn set_key_value(&mut self, key: &str, value: &str) {
        if let Some(ep) = self.epairs.iter_mut().rev().find(|ep| ep.key == key) {
            ep.value = value.to_string();
            return;
        }
        self.epairs.push(EPair {
            key: key.to_string(),
            value: value.to_string(),
        });
    }

    /// Leading number of the value; 0.0 if the key is missing or does not
    /// start with a number.
    pub fn float_for_key(&self, key: &str) -> f32 {
        parse_float_prefix(self.value_for_key(key))
    }

    /// Three space separated floats, or the origin.
    pub fn vector_for_key(&self, key: &str) -> Vec3 {
        let mut it = self
            .value_for_key(key)
            .split_whitespace()
            .map(|s| s.parse::<f32>());
        match (it.next(), it.next(), it.next()) {
            (Some(Ok(x)), Some(Ok(y)), Some(Ok(z))) => [x, y, z],
            _ => VEC3_ORIGIN,
        }
    }

    pub fn classname(&self) -> &str {
        self.value_for_key("classname")
    }
}

// ============================================================
// Tokenizer
// ============================================================

struct Script<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Script<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied().filter(|&c| c != 0)
    }

    /// Next whitespace-delimited or quoted token. With `crossline` false the
    /// token must be on the current line.
    fn get_token(&mut self, crossline: bool) -> Result<Option<String>, FormatError> {
        // skip whitespace and // comments
        loop {
            while let Some(c) = self.peek() {
                if c > b' ' {
                    break;
                }
                if c == b'\n' && !crossline {
                    return Err(FormatError::Entity("line is incomplete"));
                }
                self.pos += 1;
            }
            let Some(c) = self.peek() else {
                if !crossline {
                    return Err(FormatError::Entity("line is incomplete"));
                }
                return Ok(None);
            };
            if c == b'/' && self.data.get(self.pos + 1) == Some(&b'/') {
                if !crossline {
                    return Err(FormatError::Entity("line is incomplete"));
                }
                while let Some(c) = self.peek() {
                    self.pos += 1;
                    if c == b'\n' {
                        break;
                    }
                }
                continue;
            }
            break;
        }

        let start;
        let end;
        if self.peek() == Some(b'"') {
            self.pos += 1;
            start = self.pos;
            while let Some(c) = self.peek() {
                if c == b'"' {
                    break;
                }
                self.pos += 1;
            }
            if self.peek() != Some(b'"') {
                return Err(FormatError::Entity("quoted token without closing quote"));
            }
            end = self.pos;
            self.pos += 1;
        } else {
            start = self.pos;
            while let Some(c) = self.peek() {
                if c <= b' ' {
                    break;
                }
                self.pos += 1;
            }
            end = self.pos;
        }

        Ok(Some(String::from_utf8_lossy(&self.data[start..end]).into_owned()))
    }
}

// ============================================================
// Parse / unparse
// ============================================================

fn parse_epair(script: &mut Script, key: String) -> Result<EPair, FormatError> {
    if key.len() >= MAX_KEY - 1 {
        return Err(FormatError::TokenTooLong(key));
    }
    let value = script
        .get_token(false)?
        .ok_or(FormatError::Entity("key without value"))?;
    if value.len() >= MAX_VALUE - 1 {
        return Err(FormatError::TokenTooLong(value));
    }

    Ok(EPair {
        key: strip_trailing(&key).to_string(),
        value: strip_trailing(&value).to_string(),
    })
}

fn parse_entity(script: &mut Script) -> Result<Option<Entity>, FormatError> {
    let Some(token) = script.get_token(true)? else {
        return Ok(None);
    };
    if token != "{" {
        return Err(FormatError::Entity("\"{\" not found"));
    }

    let mut ent = Entity::default();
    loop {
        let token = script
            .get_token(true)?
            .ok_or(FormatError::Entity("EOF without closing brace"))?;
        if token == "}" {
            break;
        }
        ent.epairs.push(parse_epair(script, token)?);
    }

    Ok(Some(ent))
}

/// Parse the entities lump into entities. A trailing NUL ends the text.
pub fn parse_entities(text: &[u8]) -> Result<Vec<Entity>> {
    let mut script = Script::new(text);
    let mut entities = Vec::new();

    while let Some(ent) = parse_entity(&mut script)? {
        CapacityError::check("entities", entities.len() + 1, MAX_MAP_ENTITIES)?;
        entities.push(ent);
    }

    tracing::debug!(count = entities.len(), "parsed entities");
    Ok(entities)
}

/// Generate entities lump text, NUL terminated. Entities with no pairs were
/// removed by the compiler and are skipped.
pub fn unparse_entities(entities: &[Entity]) -> Result<Vec<u8>> {
    let mut buf = String::new();

    for ent in entities.iter().filter(|e| !e.epairs.is_empty()) {
        buf.push_str("{\n");
        for ep in &ent.epairs {
            buf.push('"');
            buf.push_str(strip_trailing(&ep.key));
            buf.push_str("\" \"");
            buf.push_str(strip_trailing(&ep.value));
            buf.push_str("\"\n");
        }
        buf.push_str("}\n");

        CapacityError::check("entity string", buf.len() + 1, MAX_MAP_ENTSTRING)?;
    }

    let mut bytes = buf.into_bytes();
    bytes.push(0);
    Ok(bytes)
}

/// Subdivide size requested by worldspawn, if it is within 256..=2048.
pub fn worldspawn_subdivide(entities: &[Entity]) -> Option<i32> {
    let world = entities.first()?;
    let subdivide = parse_int_prefix(world.value_for_key("subdivide"));
    if (256..=2048).contains(&subdivide) {
        tracing::debug!("Using subdivide {} from worldspawn", subdivide);
        return Some(subdivide);
    }
    None
}

// =============================================================================
// Tests
// =============================================================================
