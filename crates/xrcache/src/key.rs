//! Cache key composition.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::CacheError;
use crate::hasher::{canonical_json_bytes, structural_hash};

/// Identity of one cacheable result.
///
/// `hash` is a structural hash over `(hash_input, hash_function)`; it
/// contains nothing else (no timestamps, hosts or randomness).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Content hash of the input data object.
    pub hash_input: String,
    /// Hash of the call signature.
    pub hash_function: String,
    /// The combined key.
    pub hash: String,
}

impl CacheKey {
    /// The first `digits` characters of the combined key.
    pub fn short(&self, digits: usize) -> &str {
        let end = digits.min(self.hash.len());
        self.hash.get(..end).unwrap_or(&self.hash)
    }
}

/// Combines an input hash and a signature hash into a [`CacheKey`].
///
/// The pair is hashed as a canonical JSON object, so distinct pairs never
/// alias the way plain concatenation (`"ab" + "c"` vs `"a" + "bc"`) would.
/// `function` only names the caller in the error.
pub fn combine(
    function: &str,
    hash_input: &str,
    hash_function: &str,
) -> Result<CacheKey, CacheError> {
    if hash_input.is_empty() {
        return Err(CacheError::MissingInputHash {
            function: function.to_string(),
        });
    }
    let pair = json!({
        "hash_input": hash_input,
        "hash_function": hash_function,
    });
    Ok(CacheKey {
        hash_input: hash_input.to_string(),
        hash_function: hash_function.to_string(),
        hash: structural_hash(&canonical_json_bytes(&pair)),
    })
}

/// Builds the human-browsable entry name `{array}__{function}__{short}`.
///
/// Path separators and NUL in either name become `_`, and so do leading
/// dots of the result, so the name is always a single visible file name in
/// the cache directory. Leading and trailing underscores are trimmed, so an
/// unnamed input yields `{function}__{short}`.
pub fn display_name(array_name: &str, function_name: &str, short_hash: &str) -> String {
    let array_name = sanitize_name_part(array_name);
    let function_name = sanitize_name_part(function_name);
    let joined = format!("{array_name}__{function_name}__{short_hash}");
    let trimmed = joined.trim_matches('_');
    let dots = trimmed.len() - trimmed.trim_start_matches('.').len();
    format!("{}{}", "_".repeat(dots), &trimmed[dots..])
}

fn sanitize_name_part(part: &str) -> String {
    part.chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_is_deterministic() {
        let a = combine("f", "H1", "S1").unwrap();
        let b = combine("f", "H1", "S1").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.hash.len(), 64);
        assert_eq!(a.hash_input, "H1");
        assert_eq!(a.hash_function, "S1");
    }

    #[test]
    fn combine_is_not_concatenation() {
        let a = combine("f", "ab", "c").unwrap();
        let b = combine("f", "a", "bc").unwrap();
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn either_component_changes_key() {
        let base = combine("f", "H1", "S1").unwrap();
        assert_ne!(base.hash, combine("f", "H2", "S1").unwrap().hash);
        assert_ne!(base.hash, combine("f", "H1", "S2").unwrap().hash);
    }

    #[test]
    fn empty_input_hash_is_rejected() {
        let err = combine("square", "", "S1").unwrap_err();
        assert!(matches!(
            err,
            CacheError::MissingInputHash { ref function } if function == "square"
        ));
    }

    #[test]
    fn short_prefix() {
        let key = combine("f", "H1", "S1").unwrap();
        assert_eq!(key.short(3), &key.hash[..3]);
        assert_eq!(key.short(1000), key.hash);
    }

    #[test]
    fn display_name_format() {
        assert_eq!(display_name("temp", "square", "abc"), "temp__square__abc");
        assert_eq!(display_name("", "square", "abc"), "square__abc");
    }

    #[test]
    fn display_name_never_leaves_the_directory() {
        assert_eq!(
            display_name("../escaped", "square", "abc"),
            "___escaped__square__abc"
        );
        assert_eq!(display_name("temp/K", "square", "abc"), "temp_K__square__abc");
        assert_eq!(display_name("a\\b\0c", "f/g", "abc"), "a_b_c__f_g__abc");
        for name in ["../escaped", "temp/K", "/abs", "..", "."] {
            let shown = display_name(name, "square", "abc");
            let components: Vec<_> = std::path::Path::new(&shown).components().collect();
            assert_eq!(components.len(), 1, "{shown}");
            assert!(matches!(components[0], std::path::Component::Normal(_)));
        }
    }

    #[test]
    fn display_name_is_never_hidden() {
        assert_eq!(display_name(".hidden", "square", "abc"), "_hidden__square__abc");
        assert_eq!(display_name("_.x", "square", "abc"), "_x__square__abc");
        assert_eq!(display_name("", ".f", "abc"), "_f__abc");
    }
}
