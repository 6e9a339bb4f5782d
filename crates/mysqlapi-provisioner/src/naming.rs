// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Name canonicalization and generated credentials.

use sha1::{Digest, Sha1};

/// Length of the fingerprint appended to rewritten names.
const FINGERPRINT_LEN: usize = 10;

/// Longest username MySQL accepts on older servers.
const MAX_USERNAME_LEN: usize = 16;

fn sha1_hex(input: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(input.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Turn a user-supplied name into a storage-safe identifier.
///
/// Names made only of `[A-Za-z0-9_]` are returned unchanged. Otherwise every
/// run of other characters collapses into a single `_` and the first ten hex
/// characters of the SHA-1 of the original name are appended, so distinct
/// inputs stay distinct after rewriting.
pub fn canonicalize(name: &str) -> String {
    if name.chars().all(is_word_char) {
        return name.to_string();
    }

    let mut out = String::with_capacity(name.len() + FINGERPRINT_LEN);
    let mut in_run = false;
    for c in name.chars() {
        if is_word_char(c) {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    out.push_str(&sha1_hex(name)[..FINGERPRINT_LEN]);
    out
}

/// Password derived from `input` and the deployment salt.
pub fn generate_password(input: &str, salt: &str) -> String {
    sha1_hex(&format!("{input}{salt}"))
}

/// Username for `name`, shortened to fit MySQL's username limit.
pub fn generate_user(name: &str, salt: &str) -> String {
    if name.chars().count() > MAX_USERNAME_LEN {
        let head: String = name.chars().take(12).collect();
        format!("{head}{}", &generate_password(name, salt)[..4])
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_names_are_unchanged() {
        assert_eq!(canonicalize("ciclops"), "ciclops");
        assert_eq!(canonicalize("my_app_2"), "my_app_2");
        assert_eq!(canonicalize(""), "");
    }

    #[test]
    fn test_dash_is_rewritten_with_fingerprint() {
        // sha1("foo-bar") = db7329d5a3...
        assert_eq!(canonicalize("foo-bar"), "foo_bardb7329d5a3");
    }

    #[test]
    fn test_spaces_are_rewritten_with_fingerprint() {
        // sha1(" foo ") = a28da86907...
        assert_eq!(canonicalize(" foo "), "_foo_a28da86907");
    }

    #[test]
    fn test_runs_collapse_into_one_underscore() {
        // sha1("my app!!") = f1dca54f0b...
        assert_eq!(canonicalize("my app!!"), "my_app_f1dca54f0b");
    }

    #[test]
    fn test_canonicalize_is_idempotent() {
        for name in ["foo-bar", " foo ", "my app!!", "plain", "a.b.c", "ünïcode"] {
            let once = canonicalize(name);
            assert_eq!(canonicalize(&once), once, "not idempotent for {name:?}");
        }
    }

    #[test]
    fn test_distinct_names_stay_distinct() {
        assert_ne!(canonicalize("a-b"), canonicalize("a.b"));
        assert_ne!(canonicalize("a-b"), "a_b");
    }

    #[test]
    fn test_generate_password_uses_salt() {
        // sha1("ciclopssalt")
        assert_eq!(
            generate_password("ciclops", "salt"),
            "a81296a0b0d5d354ddfdfbddfea745f51bcdae4b"
        );
        assert_ne!(
            generate_password("ciclops", "salt"),
            generate_password("ciclops", "pepper")
        );
    }

    #[test]
    fn test_generate_user_short_name() {
        assert_eq!(generate_user("ciclops", "salt"), "ciclops");
        assert_eq!(generate_user("sixteen_chars_ok", "salt"), "sixteen_chars_ok");
    }

    #[test]
    fn test_generate_user_long_name() {
        // sha1("averyveryverylongnamesalt") = 6a39548a...
        let user = generate_user("averyveryverylongname", "salt");
        assert_eq!(user, "averyveryver6a39");
        assert_eq!(user.len(), 16);
    }
}
