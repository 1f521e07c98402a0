//! Text rendering for resolution diagnostics.
//!
//! Everything here works on `std::any::type_name` strings, so the
//! container can hand over what it has without formatting first.

use std::collections::BTreeSet;

/// Characters that end one path inside a type name.
const TYPE_DELIMITERS: &[char] = &['<', '>', ',', ' ', '(', ')', '[', ']', ';', '&'];

/// Renders the types of a dependency cycle, outermost first.
///
/// Names are shortened; the closing type repeats the first one.
///
/// # Examples
/// ```
/// use furnish_support::rendering::render_cycle;
///
/// let cycle = ["app::Mailer", "alloc::sync::Arc<app::Session>", "app::Mailer"];
/// assert_eq!(render_cycle(&cycle), "Mailer → Arc<Session> → Mailer");
/// ```
pub fn render_cycle(type_names: &[impl AsRef<str>]) -> String {
    let names: Vec<String> = type_names
        .iter()
        .map(|name| shorten_type_name(name.as_ref()))
        .collect();
    names.join(" → ")
}

/// Renders the factories competing for one requested type, one per line.
///
/// Each candidate is the produced type name and, when known, what
/// registered it.
///
/// ```
/// use furnish_support::rendering::render_factories;
///
/// let rendered = render_factories(&[
///     ("alloc::sync::Arc<app::English>", Some("service English")),
///     ("alloc::sync::Arc<app::French>", None),
/// ]);
/// assert_eq!(
///     rendered,
///     "#1 Arc<English> (registered by service English)\n#2 Arc<French>"
/// );
/// ```
pub fn render_factories(candidates: &[(&str, Option<&str>)]) -> String {
    candidates
        .iter()
        .enumerate()
        .map(|(i, (type_name, origin))| {
            let short = shorten_type_name(type_name);
            match origin {
                Some(origin) => format!("#{} {short} (registered by {origin})", i + 1),
                None => format!("#{} {short}", i + 1),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Strips module paths from every path inside a type name.
///
/// ```
/// use furnish_support::rendering::shorten_type_name;
///
/// assert_eq!(shorten_type_name("my_app::services::UserService"), "UserService");
/// assert_eq!(
///     shorten_type_name("alloc::sync::Arc<dyn my_app::traits::Logger>"),
///     "Arc<dyn Logger>"
/// );
/// ```
pub fn shorten_type_name(type_name: &str) -> String {
    type_name
        .split_inclusive(TYPE_DELIMITERS)
        .map(|piece| piece.rsplit("::").next().unwrap_or(piece))
        .collect()
}

/// Registered type names close to `requested`, closest first.
///
/// Short names are compared case-insensitively. A name matches when one
/// contains the other, or when it is a few edits away from the request.
pub fn suggest_similar(requested: &str, available: &[&str], max_suggestions: usize) -> Vec<String> {
    let wanted = shorten_type_name(requested).to_lowercase();
    let tolerance = (wanted.chars().count() / 3).max(2);

    let mut ranked: BTreeSet<(usize, &str)> = BTreeSet::new();
    for &name in available.iter().filter(|&&name| name != requested) {
        let short = shorten_type_name(name).to_lowercase();
        let distance = edit_distance(&wanted, &short);

        if short.contains(&wanted) || wanted.contains(&short) {
            ranked.insert((0, name));
        } else if distance <= tolerance {
            ranked.insert((distance, name));
        }
    }

    ranked
        .into_iter()
        .take(max_suggestions)
        .map(|(_, name)| name.to_string())
        .collect()
}

/// Levenshtein distance over chars.
fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut current = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != *cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        previous = current;
    }

    previous[b.len()]
}
