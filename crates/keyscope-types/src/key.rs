//! Composite key scheme.
//!
//! A composite key joins a base name and zero or more scope segments with
//! [`DELIMITER`]:
//!
//! - `name` -- a bare scalar
//! - `name$child` -- one level of map or scope nesting
//! - `name$key` -- the key-set index of the `name` prefix
//! - `name$3` / `name$size` -- list element and list length
//!
//! The scheme is part of the on-disk contract and must stay bit-exact.
//! The delimiter is reserved: a base name or segment containing it is a
//! configuration error. The index segment `key` is reserved as a child
//! segment so that no child entry can alias the index entry.

use crate::error::{KeyError, KeyResult};

/// Separator between the base name and each scope segment.
pub const DELIMITER: char = '$';

/// Segment naming the key-set index of a prefix.
pub const INDEX_SEGMENT: &str = "key";

/// Segment naming the length counter of a list prefix.
pub const SIZE_SEGMENT: &str = "size";

/// Validate a base name.
pub fn validate_base(name: &str) -> KeyResult<()> {
    if name.is_empty() {
        return Err(KeyError::EmptyBase);
    }
    if name.contains(DELIMITER) {
        return Err(KeyError::ReservedDelimiter {
            segment: name.to_string(),
        });
    }
    Ok(())
}

/// Validate a scope segment or map key.
pub fn validate_segment(segment: &str) -> KeyResult<()> {
    if segment.contains(DELIMITER) {
        return Err(KeyError::ReservedDelimiter {
            segment: segment.to_string(),
        });
    }
    if segment == INDEX_SEGMENT {
        return Err(KeyError::ReservedSegment {
            segment: segment.to_string(),
        });
    }
    Ok(())
}

/// Compose a flat store key from a base name and scope segments.
///
/// Segments are appended left to right: the outer property name first, the
/// innermost nested key last.
///
/// ```
/// use keyscope_types::compose_key;
///
/// assert_eq!(compose_key("user", &["a", "b"]).unwrap(), "user$a$b");
/// assert_eq!(compose_key::<&str>("user", &[]).unwrap(), "user");
/// assert!(compose_key("user", &["a$b"]).is_err());
/// ```
pub fn compose_key<S: AsRef<str>>(base: &str, segments: &[S]) -> KeyResult<String> {
    validate_base(base)?;
    for segment in segments {
        validate_segment(segment.as_ref())?;
    }
    Ok(join(base, segments.iter().map(AsRef::as_ref)))
}

/// Key of the child `segment` under `prefix`.
pub fn child_key(prefix: &str, segment: &str) -> KeyResult<String> {
    validate_segment(segment)?;
    Ok(join(prefix, [segment]))
}

/// Key of the key-set index belonging to `prefix`.
pub fn index_key(prefix: &str) -> String {
    join(prefix, [INDEX_SEGMENT])
}

/// Key of the list length counter belonging to `prefix`.
pub fn size_key(prefix: &str) -> String {
    join(prefix, [SIZE_SEGMENT])
}

/// Key of list element `index` under `prefix`.
pub fn element_key(prefix: &str, index: usize) -> String {
    format!("{prefix}{DELIMITER}{index}")
}

pub(crate) fn join<'a>(base: &str, segments: impl IntoIterator<Item = &'a str>) -> String {
    let mut key = String::from(base);
    for segment in segments {
        key.push(DELIMITER);
        key.push_str(segment);
    }
    key
}
