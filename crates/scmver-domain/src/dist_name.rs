/// Normalize a distribution name as mandated by PEP 503: lowercase, with
/// runs of `-`, `_` and `.` collapsed into a single `-`.
pub fn canonicalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for ch in name.chars() {
        if matches!(ch, '-' | '_' | '.') {
            pending_sep = !out.is_empty();
        } else {
            if pending_sep {
                out.push('-');
                pending_sep = false;
            }
            out.extend(ch.to_lowercase());
        }
    }
    out
}

/// Derive the environment-variable suffix for a distribution: the canonical
/// name with `-` replaced by `_`, upper-cased.
pub fn env_var_dist_name(dist_name: &str) -> String {
    canonicalize_name(dist_name).replace('-', "_").to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_separator_runs() {
        assert_eq!(canonicalize_name("My.Pkg__Name"), "my-pkg-name");
        assert_eq!(canonicalize_name("simple"), "simple");
        assert_eq!(canonicalize_name("a---b"), "a-b");
    }

    #[test]
    fn env_suffix_uses_underscores() {
        assert_eq!(env_var_dist_name("my-pkg"), "MY_PKG");
        assert_eq!(env_var_dist_name("My.Weird_Name"), "MY_WEIRD_NAME");
    }
}
