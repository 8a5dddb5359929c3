//! Dotted-path addressing into JSON values.
//!
//! A path is a sequence of segments separated by `.`. Each segment is either
//! an object key or an array index. Both `alerts.0.labels.job` and
//! `alerts[0].labels.job` address the same value — bracket notation is
//! folded into the same dotted form during parsing, so a purely numeric
//! segment is always treated as an array index rather than an object key.
//! Whitespace around a key or index is ignored.

use serde_json::Value;

/// A single parsed path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Parse a path string into segments.
///
/// `a.b[2].c` and `a.b.2.c` both parse to `[Key(a), Key(b), Index(2), Key(c)]`.
pub fn parse(path: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    for raw in path.split('.') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let mut rest = raw;
        // Split off any `key[idx]` or `[idx]` bracket suffixes within a dot segment.
        loop {
            if let Some(bracket_start) = rest.find('[') {
                let (key_part, bracket_rest) = rest.split_at(bracket_start);
                let key_part = key_part.trim();
                if !key_part.is_empty() {
                    segments.push(parse_one(key_part));
                }
                let bracket_rest = &bracket_rest[1..];
                if let Some(end) = bracket_rest.find(']') {
                    let idx_str = bracket_rest[..end].trim();
                    if let Ok(idx) = idx_str.parse::<usize>() {
                        segments.push(Segment::Index(idx));
                    } else {
                        segments.push(Segment::Key(idx_str.to_string()));
                    }
                    rest = &bracket_rest[end + 1..];
                } else {
                    rest = bracket_rest;
                }
            } else {
                let rest_trimmed = rest.trim();
                if !rest_trimmed.is_empty() {
                    segments.push(parse_one(rest_trimmed));
                }
                break;
            }
        }
    }
    segments
}

fn parse_one(s: &str) -> Segment {
    let s = s.trim();
    if let Ok(idx) = s.parse::<usize>() {
        Segment::Index(idx)
    } else {
        Segment::Key(s.to_string())
    }
}

/// Get a value at `path` from `root`. Returns `None` if any segment is
/// missing or a type mismatch occurs (e.g. indexing into an object).
pub fn get<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let segments = parse(path);
    let mut current = root;
    for seg in &segments {
        current = match (seg, current) {
            (Segment::Key(k), Value::Object(map)) => map.get(k)?,
            (Segment::Index(i), Value::Array(arr)) => arr.get(*i)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Set a value at `path` within `root`, creating intermediate objects and
/// arrays as needed. Array segments extend the array with empty objects if
/// the index is out of bounds.
pub fn set(root: &mut Value, path: &str, value: Value) {
    let segments = parse(path);
    if segments.is_empty() {
        return;
    }
    set_rec(root, &segments, value);
}

fn set_rec(current: &mut Value, segments: &[Segment], value: Value) {
    let (head, tail) = (&segments[0], &segments[1..]);
    match head {
        Segment::Key(k) => {
            if !current.is_object() {
                *current = Value::Object(serde_json::Map::new());
            }
            let map = current.as_object_mut().unwrap();
            if tail.is_empty() {
                map.insert(k.clone(), value);
            } else {
                let entry = map
                    .entry(k.clone())
                    .or_insert_with(|| default_container(&tail[0]));
                set_rec(entry, tail, value);
            }
        }
        Segment::Index(i) => {
            if !current.is_array() {
                *current = Value::Array(Vec::new());
            }
            let arr = current.as_array_mut().unwrap();
            while arr.len() <= *i {
                arr.push(Value::Object(serde_json::Map::new()));
            }
            if tail.is_empty() {
                arr[*i] = value;
            } else {
                set_rec(&mut arr[*i], tail, value);
            }
        }
    }
}

fn default_container(next: &Segment) -> Value {
    match next {
        Segment::Key(_) => Value::Object(serde_json::Map::new()),
        Segment::Index(_) => Value::Array(Vec::new()),
    }
}

/// Delete the value at `path` from `root`. No-op if the path doesn't exist.
pub fn delete(root: &mut Value, path: &str) {
    let segments = parse(path);
    if segments.is_empty() {
        return;
    }
    delete_rec(root, &segments);
}

fn delete_rec(current: &mut Value, segments: &[Segment]) {
    if segments.len() == 1 {
        match (&segments[0], current) {
            (Segment::Key(k), Value::Object(map)) => {
                map.remove(k);
            }
            (Segment::Index(i), Value::Array(arr)) => {
                if *i < arr.len() {
                    arr.remove(*i);
                }
            }
            _ => {}
        }
        return;
    }
    let (head, tail) = (&segments[0], &segments[1..]);
    match (head, current) {
        (Segment::Key(k), Value::Object(map)) => {
            if let Some(next) = map.get_mut(k) {
                delete_rec(next, tail);
            }
        }
        (Segment::Index(i), Value::Array(arr)) => {
            if let Some(next) = arr.get_mut(*i) {
                delete_rec(next, tail);
            }
        }
        _ => {}
    }
}
