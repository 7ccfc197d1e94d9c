use crate::models::Platform;

/// Resolve a feed platform label to the platforms it covers.
///
/// Labels are matched after lowercasing and stripping punctuation, and may list
/// several platforms ("Steam, Epic", "PS / Xbox"). "PC" covers both PC
/// storefronts; "Universal" stays the sentinel and is expanded later.
/// Unknown fragments are dropped.
pub fn resolve_platforms(label: &str) -> Vec<Platform> {
    let mut out: Vec<Platform> = Vec::new();
    for fragment in label.split([',', '/', '&', '|', ';', '+']) {
        let token = normalize_token(fragment);
        let hits: &[Platform] = match token.as_str() {
            "universal" | "all" | "allplatforms" | "crossplatform" => &[Platform::Universal],
            "pc" => &[Platform::Steam, Platform::Epic],
            "steam" => &[Platform::Steam],
            "epic" | "epicgames" | "epicgamesstore" | "egs" => &[Platform::Epic],
            "psn" | "ps" | "ps4" | "ps5" | "playstation" | "playstation4" | "playstation5" => {
                &[Platform::Psn]
            }
            "xbox" | "xboxlive" | "xb1" | "xboxone" | "xboxseries" | "xboxseriesxs" => {
                &[Platform::Xboxlive]
            }
            "stadia" => &[Platform::Stadia],
            "nintendo" | "switch" | "nintendoswitch" | "switch2" => &[Platform::Nintendo],
            _ => &[],
        };
        for p in hits {
            if !out.contains(p) {
                out.push(*p);
            }
        }
    }
    if out.contains(&Platform::Universal) {
        return vec![Platform::Universal];
    }
    out
}

fn normalize_token(raw: &str) -> String {
    raw.trim()
        .to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_single_labels() {
        assert_eq!(resolve_platforms("Universal"), vec![Platform::Universal]);
        assert_eq!(resolve_platforms("PlayStation"), vec![Platform::Psn]);
        assert_eq!(resolve_platforms("Xbox Live"), vec![Platform::Xboxlive]);
    }

    #[test]
    fn expands_pc_and_lists() {
        assert_eq!(resolve_platforms("PC"), vec![Platform::Steam, Platform::Epic]);
        assert_eq!(
            resolve_platforms("Steam, PS5 / Xbox"),
            vec![Platform::Steam, Platform::Psn, Platform::Xboxlive]
        );
    }

    #[test]
    fn universal_absorbs_everything_else() {
        assert_eq!(resolve_platforms("Steam, Universal"), vec![Platform::Universal]);
    }

    #[test]
    fn drops_unknown_labels() {
        assert!(resolve_platforms("Dreamcast").is_empty());
        assert!(resolve_platforms("").is_empty());
    }
}
