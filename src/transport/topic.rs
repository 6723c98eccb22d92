/// Check whether a concrete `topic` matches a subscription `filter`.
///
/// Filters follow the usual MQTT rules: levels are separated by `/`, `+`
/// matches exactly one level and a trailing `#` matches the parent level and
/// everything below it.
#[must_use]
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    if filter == topic {
        return true;
    }
    if filter == "#" {
        return true;
    }

    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
