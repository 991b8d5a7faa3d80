//! Tilde expansion: `~`, `~user`.

/// Expand a tilde prefix. `None` user means the current user's `$HOME`
/// (passed in by the caller, since it lives in shell state); a named
/// user resolves through the password database. An unknown user leaves
/// the original text alone, as bash does.
pub fn expand_tilde(user: Option<&str>, home: Option<&str>) -> String {
    match user {
        None => home.unwrap_or("~").to_string(),
        Some(name) => match nix::unistd::User::from_name(name) {
            Ok(Some(entry)) => entry.dir.to_string_lossy().into_owned(),
            _ => format!("~{}", name),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_tilde_uses_home() {
        assert_eq!(expand_tilde(None, Some("/home/me")), "/home/me");
    }

    #[test]
    fn bare_tilde_without_home_stays() {
        assert_eq!(expand_tilde(None, None), "~");
    }

    #[test]
    fn unknown_user_stays_literal() {
        assert_eq!(expand_tilde(Some("nో_such_user"), Some("/home/me")), "~nో_such_user");
    }
}
