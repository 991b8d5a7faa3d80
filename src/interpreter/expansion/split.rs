//! IFS field splitting.
//!
//! Whitespace IFS characters collapse and trim; non-whitespace IFS
//! characters are hard separators that preserve empty fields. A
//! backslash protects the following IFS character from splitting.

/// One split fragment plus whether a field boundary follows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPiece {
    pub text: String,
    /// A delimiter followed this fragment (so something after it starts
    /// a new field).
    pub boundary_after: bool,
}

/// Split `text` on the IFS characters, reporting leading/trailing
/// delimiter presence so the caller can join fragments across adjacent
/// word parts correctly.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SplitResult {
    pub fields: Vec<String>,
    pub leading_boundary: bool,
    pub trailing_boundary: bool,
}

pub fn split_fields(text: &str, ifs: &str) -> SplitResult {
    if ifs.is_empty() {
        // Empty IFS: no splitting at all.
        return SplitResult {
            fields: vec![text.to_string()],
            leading_boundary: false,
            trailing_boundary: false,
        };
    }

    let ws: Vec<char> = ifs.chars().filter(|c| c.is_whitespace()).collect();
    let hard: Vec<char> = ifs.chars().filter(|c| !c.is_whitespace()).collect();
    let chars: Vec<char> = text.chars().collect();

    let mut fields: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut have_field = false;
    let mut leading_boundary = false;
    let mut trailing_boundary = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '\\' && i + 1 < chars.len() && ifs.contains(chars[i + 1]) {
            // Escaped IFS character: keep it, no split.
            current.push(chars[i + 1]);
            have_field = true;
            i += 2;
            continue;
        }
        if ws.contains(&c) {
            // Whitespace run: one boundary, however long; also eats
            // whitespace around hard separators.
            let mut j = i;
            while j < chars.len() && ws.contains(&chars[j]) {
                j += 1;
            }
            let hard_next = j < chars.len() && hard.contains(&chars[j]);
            if have_field {
                fields.push(std::mem::take(&mut current));
                have_field = false;
            } else if i == 0 {
                leading_boundary = true;
            }
            if hard_next {
                // The hard separator handles the boundary itself; the
                // whitespace around it is decoration.
                if fields.is_empty() && i == 0 {
                    // `  :a`: leading whitespace then a hard separator
                    // still delimits an initial empty field in POSIX.
                    fields.push(String::new());
                }
                i = j;
                continue;
            }
            if j >= chars.len() {
                trailing_boundary = true;
            }
            i = j;
            continue;
        }
        if hard.contains(&c) {
            // Hard separator: always a boundary, empty fields preserved.
            fields.push(std::mem::take(&mut current));
            have_field = false;
            trailing_boundary = true;
            i += 1;
            // Skip whitespace after the separator.
            while i < chars.len() && ws.contains(&chars[i]) {
                i += 1;
            }
            continue;
        }
        current.push(c);
        have_field = true;
        trailing_boundary = false;
        i += 1;
    }
    if have_field {
        fields.push(current);
        trailing_boundary = false;
    }

    SplitResult { fields, leading_boundary, trailing_boundary }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(text: &str, ifs: &str) -> Vec<String> {
        split_fields(text, ifs).fields
    }

    #[test]
    fn default_ifs_collapses_whitespace() {
        assert_eq!(fields("  a   b  c ", " \t\n"), vec!["a", "b", "c"]);
    }

    #[test]
    fn empty_input_no_fields() {
        assert_eq!(fields("", " \t\n"), Vec::<String>::new());
        assert_eq!(fields("   ", " \t\n"), Vec::<String>::new());
    }

    #[test]
    fn hard_separator_preserves_empty_fields() {
        assert_eq!(fields("a::b", ":"), vec!["a", "", "b"]);
        assert_eq!(fields(":a", ":"), vec!["", "a"]);
    }

    #[test]
    fn trailing_hard_separator_is_a_boundary_not_a_field() {
        // `a:` yields one field in POSIX; the trailing delimiter only
        // matters for joining with following parts.
        let r = split_fields("a:", ":");
        assert_eq!(r.fields, vec!["a"]);
        assert!(r.trailing_boundary);
    }

    #[test]
    fn mixed_whitespace_and_hard() {
        assert_eq!(fields("a : b", ": "), vec!["a", "b"]);
        assert_eq!(fields("a :: b", ": "), vec!["a", "", "b"]);
    }

    #[test]
    fn empty_ifs_means_no_split() {
        assert_eq!(fields("a b c", ""), vec!["a b c"]);
    }

    #[test]
    fn backslash_protects_ifs_char() {
        assert_eq!(fields("a\\ b c", " \t\n"), vec!["a b", "c"]);
    }

    #[test]
    fn leading_and_trailing_flags() {
        let r = split_fields(" x ", " \t\n");
        assert!(r.leading_boundary);
        assert!(r.trailing_boundary);
        assert_eq!(r.fields, vec!["x"]);
    }

    #[test]
    fn leading_hard_after_whitespace() {
        assert_eq!(fields("  :a", ": "), vec!["", "a"]);
    }
}
