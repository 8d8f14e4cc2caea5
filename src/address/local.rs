/// Non-alphanumeric characters allowed in an RFC 5322 atom.
const ATEXT_SPECIALS: &str = "!#$%&'*+-/=?^_`{|}~";

fn is_atom(atom: &str) -> bool {
    !atom.is_empty()
        && atom
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || ATEXT_SPECIALS.contains(c))
}

/// Dot-atom form: non-empty atoms separated by single dots.
pub(crate) fn is_dot_atom(local: &str) -> bool {
    local.split('.').all(is_atom)
}

/// Quoted-string local parts are passed to the server untouched, as long as
/// they carry no CR/LF that could split an SMTP command.
pub(crate) fn is_local_acceptable(local: &str) -> bool {
    match local.strip_prefix('"').and_then(|rest| rest.strip_suffix('"')) {
        Some(inner) => !inner.contains(['\r', '\n']),
        None => is_dot_atom(local),
    }
}
