//! Text rendering for error messages and diagnostic descriptions.
//!
//! Type names coming out of [`std::any::type_name`] are long and noisy
//! (`my_app::reporting::ReportGenerator`), so everything user-facing goes
//! through these helpers first.

/// Renders a resolution path as a single line.
///
/// # Examples
/// ```
/// use mawrid_support::rendering::render_path;
///
/// let path = vec!["ServiceA", "ServiceB", "ServiceA"];
/// assert_eq!(render_path(&path), "ServiceA → ServiceB → ServiceA");
/// ```
pub fn render_path(path: &[impl AsRef<str>]) -> String {
    path.iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join(" → ")
}

/// One line of a vertically rendered dependency edge list.
#[derive(Debug, Clone)]
pub struct PathEntry {
    /// Display name of the component
    pub type_name: String,
    /// Lifestyle label, e.g. "Singleton"
    pub lifestyle: String,
}

impl PathEntry {
    pub fn new(type_name: impl Into<String>, lifestyle: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            lifestyle: lifestyle.into(),
        }
    }
}

/// Renders a consumer → dependency chain with lifestyle annotations.
///
/// ```text
/// [Singleton] ReportGenerator
///             ↓
/// [Transient] ConsoleLogger
/// ```
pub fn render_edges(entries: &[PathEntry]) -> String {
    let width = entries
        .iter()
        .map(|e| e.lifestyle.len())
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    for (i, entry) in entries.iter().enumerate() {
        if i > 0 {
            out.push_str(&" ".repeat(width + 3));
            out.push_str("↓\n");
        }
        out.push_str(&format!(
            "[{:<width$}] {}\n",
            entry.lifestyle,
            entry.type_name,
            width = width,
        ));
    }
    out
}

/// Strips module paths from a fully qualified type name, keeping generics.
///
/// ```
/// use mawrid_support::rendering::short_name;
///
/// assert_eq!(short_name("my_app::services::user::UserService"), "UserService");
/// assert_eq!(
///     short_name("alloc::sync::Arc<dyn my_app::traits::Logger>"),
///     "Arc<dyn Logger>"
/// );
/// ```
pub fn short_name(full_name: &str) -> String {
    let mut result = String::with_capacity(full_name.len());
    let mut segment = String::new();
    let mut chars = full_name.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            ':' if chars.peek() == Some(&':') => {
                chars.next();
                segment.clear();
            }
            '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | ';' | '&' => {
                result.push_str(&segment);
                result.push(ch);
                segment.clear();
            }
            _ => segment.push(ch),
        }
    }

    result.push_str(&segment);
    result
}

/// Picks registered names that look like what was requested.
///
/// Used for "did you mean" hints on missing registrations. Substring hits
/// rank above short-name hits, which rank above a shared prefix of three or
/// more characters.
pub fn closest_matches(requested: &str, available: &[&str], max: usize) -> Vec<String> {
    let requested_lower = requested.to_lowercase();
    let requested_short = short_name(requested).to_lowercase();

    let mut scored: Vec<(&str, usize)> = available
        .iter()
        .filter(|&&name| name != requested)
        .filter_map(|&name| {
            let name_lower = name.to_lowercase();
            let name_short = short_name(name).to_lowercase();

            if name_lower.contains(&requested_lower) || requested_lower.contains(&name_lower) {
                return Some((name, 100));
            }

            if name_short.contains(&requested_short) || requested_short.contains(&name_short) {
                return Some((name, 80));
            }

            let common = name_short
                .chars()
                .zip(requested_short.chars())
                .take_while(|(a, b)| a == b)
                .count();

            (common >= 3).then_some((name, common * 10))
        })
        .collect();

    scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    scored
        .into_iter()
        .take(max)
        .map(|(name, _)| name.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_with_cycle() {
        assert_eq!(render_path(&["A", "B", "C", "A"]), "A → B → C → A");
    }

    #[test]
    fn empty_path() {
        let path: Vec<&str> = vec![];
        assert_eq!(render_path(&path), "");
    }

    #[test]
    fn short_name_of_plain_path() {
        assert_eq!(short_name("app::reporting::ReportGenerator"), "ReportGenerator");
    }

    #[test]
    fn short_name_keeps_generics() {
        assert_eq!(
            short_name("mawrid_container::collection::Collection<dyn app::Plugin>"),
            "Collection<dyn Plugin>"
        );
    }

    #[test]
    fn short_name_without_path() {
        assert_eq!(short_name("u32"), "u32");
    }

    #[test]
    fn matches_typo() {
        let available = vec!["app::UserService", "app::UserRepository", "app::Logger"];
        let found = closest_matches("app::UserServise", &available, 3);
        assert!(!found.is_empty());
        assert!(found[0].contains("User"));
    }

    #[test]
    fn skips_exact_name() {
        let available = vec!["app::Logger"];
        assert!(closest_matches("app::Logger", &available, 3).is_empty());
    }

    #[test]
    fn no_match() {
        let available = vec!["app::Database"];
        assert!(closest_matches("XyzAbc", &available, 3).is_empty());
    }

    #[test]
    fn edges_render_vertically() {
        let rendered = render_edges(&[
            PathEntry::new("ReportGenerator", "Singleton"),
            PathEntry::new("ConsoleLogger", "Transient"),
        ]);
        assert!(rendered.starts_with("[Singleton] ReportGenerator"));
        assert!(rendered.contains("↓"));
        assert!(rendered.contains("[Transient] ConsoleLogger"));
    }
}
