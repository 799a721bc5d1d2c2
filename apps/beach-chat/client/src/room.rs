//! Input routing for the terminal room, where several views share one stdin.

use beach_chat_core::SessionIdentity;

/// Picks the view a stdin line is meant for.
///
/// `@<username> <text>` addresses a view by name, matching the longest
/// username that prefixes the rest of the line so names may contain spaces.
/// `@<n> <text>` addresses the n-th view, counting from 1. Any other line goes
/// to the first view. `None` when an `@` target matches nothing.
pub fn route_line<'a>(users: &[SessionIdentity], line: &'a str) -> Option<(usize, &'a str)> {
    let Some(rest) = line.strip_prefix('@') else {
        return (!users.is_empty()).then_some((0, line));
    };

    let by_name = users
        .iter()
        .enumerate()
        .filter_map(|(index, user)| {
            let text = addressed_text(rest, user.as_str())?;
            Some((user.as_str().len(), index, text))
        })
        .max_by_key(|(len, _, _)| *len);
    if let Some((_, index, text)) = by_name {
        return Some((index, text));
    }

    let (number, text) = rest.split_once(' ').unwrap_or((rest, ""));
    let number = number.parse::<usize>().ok()?;
    (1..=users.len())
        .contains(&number)
        .then(|| (number - 1, text))
}

/// Text after `name` when `rest` is `name` alone or `name` plus a space.
fn addressed_text<'a>(rest: &'a str, name: &str) -> Option<&'a str> {
    let after = rest.strip_prefix(name)?;
    if after.is_empty() {
        return Some(after);
    }
    after.strip_prefix(' ')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users(names: &[&str]) -> Vec<SessionIdentity> {
        names.iter().copied().map(SessionIdentity::new).collect()
    }

    #[test]
    fn names_with_spaces_are_addressable() {
        let room = users(&["User A", "User B"]);
        assert_eq!(route_line(&room, "@User B hi there"), Some((1, "hi there")));
        assert_eq!(route_line(&room, "@User A hello"), Some((0, "hello")));
    }

    #[test]
    fn longest_matching_name_wins() {
        let room = users(&["Al", "Al Smith"]);
        assert_eq!(route_line(&room, "@Al Smith yo"), Some((1, "yo")));
        assert_eq!(route_line(&room, "@Al yo"), Some((0, "yo")));
        assert_eq!(route_line(&room, "@Alex yo"), None);
    }

    #[test]
    fn numbers_and_bare_lines() {
        let room = users(&["User A", "User B"]);
        assert_eq!(route_line(&room, "@2 hi"), Some((1, "hi")));
        assert_eq!(route_line(&room, "@3 hi"), None);
        assert_eq!(route_line(&room, "@0 hi"), None);
        assert_eq!(route_line(&room, "plain text"), Some((0, "plain text")));
        assert_eq!(route_line(&room, "@User B"), Some((1, "")));
        assert_eq!(route_line(&[], "plain text"), None);
    }
}
