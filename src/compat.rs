//! Host compatibility table
//!
//! Many single-page apps paint opaque backgrounds on their wrappers, which
//! hides the overlay. Each entry here names a structural pattern and makes
//! its matches transparent. This is heuristic and host-specific: add entries
//! for new hosts here without touching the presence controller.
//!
//! Bump [`COMPAT_TABLE_VERSION`] whenever entries change.

/// Version of the entry list below
pub const COMPAT_TABLE_VERSION: u32 = 3;

/// Override stylesheet element id
pub const OVERRIDE_STYLESHEET_ID: &str = "aurora-dream-overrides";

/// How an entry selects host elements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matcher {
    /// Element name, e.g. `main`
    Tag(&'static str),
    /// Exact id, e.g. `__next`
    Id(&'static str),
    /// Attribute equals a value, e.g. `role="main"`
    AttrEquals {
        attr: &'static str,
        value: &'static str,
    },
    /// Attribute value contains a substring, e.g. class contains `sidebar`
    AttrContains {
        attr: &'static str,
        needle: &'static str,
    },
}

impl Matcher {
    /// CSS selector for this pattern
    pub fn selector(&self) -> String {
        match self {
            Matcher::Tag(tag) => (*tag).to_string(),
            Matcher::Id(id) => format!("#{id}"),
            Matcher::AttrEquals { attr, value } => format!("[{attr}=\"{value}\"]"),
            Matcher::AttrContains { attr, needle } => format!("[{attr}*=\"{needle}\"]"),
        }
    }
}

/// One compatibility entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompatEntry {
    pub matcher: Matcher,
    /// Also force an inline `background` on matches (side panels that set
    /// their color from script and win over stylesheets)
    pub inline: bool,
}

const fn entry(matcher: Matcher, inline: bool) -> CompatEntry {
    CompatEntry { matcher, inline }
}

const fn class_contains(needle: &'static str) -> Matcher {
    Matcher::AttrContains {
        attr: "class",
        needle,
    }
}

pub const COMPAT_TABLE: &[CompatEntry] = &[
    entry(Matcher::Tag("html"), false),
    entry(Matcher::Tag("body"), false),
    entry(Matcher::Tag("main"), false),
    entry(Matcher::Tag("app-root"), false),
    entry(Matcher::Id("__next"), false),
    entry(Matcher::Id("root"), false),
    entry(Matcher::Id("app"), false),
    entry(class_contains("app-root"), false),
    entry(class_contains("wrapper"), false),
    entry(class_contains("sidebar"), true),
    entry(class_contains("side-panel"), true),
    entry(
        Matcher::AttrContains {
            attr: "data-testid",
            needle: "sidebar",
        },
        true,
    ),
];

/// Where inline overrides land on each insertion cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineTarget {
    /// First element child of the attachment point (the host's app root)
    FirstContentWrapper,
    /// Every element matching a pattern
    Matching(Matcher),
}

/// Inline override targets, in application order
pub fn inline_targets() -> Vec<InlineTarget> {
    std::iter::once(InlineTarget::FirstContentWrapper)
        .chain(
            COMPAT_TABLE
                .iter()
                .filter(|e| e.inline)
                .map(|e| InlineTarget::Matching(e.matcher)),
        )
        .collect()
}

/// Override stylesheet text. No pattern may match the overlay container.
pub fn override_css() -> String {
    let selectors: Vec<String> = COMPAT_TABLE.iter().map(|e| e.matcher.selector()).collect();
    format!(
        "/* Aurora Dream: host compatibility v{COMPAT_TABLE_VERSION} */\n{} {{\n  background: transparent !important;\n  background-color: transparent !important;\n}}\n",
        selectors.join(",\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selectors() {
        assert_eq!(Matcher::Tag("main").selector(), "main");
        assert_eq!(Matcher::Id("__next").selector(), "#__next");
        assert_eq!(class_contains("sidebar").selector(), "[class*=\"sidebar\"]");
        let role = Matcher::AttrEquals {
            attr: "role",
            value: "main",
        };
        assert_eq!(role.selector(), "[role=\"main\"]");
    }

    #[test]
    fn test_override_css_covers_table() {
        let css = override_css();
        for e in COMPAT_TABLE {
            assert!(css.contains(&e.matcher.selector()));
        }
        assert!(css.contains("background: transparent !important;"));
        assert!(css.contains(&format!("v{COMPAT_TABLE_VERSION}")));
        assert!(!css.contains("aurora-dream-container"));
    }

    #[test]
    fn test_inline_targets_start_with_wrapper() {
        let targets = inline_targets();
        assert_eq!(targets[0], InlineTarget::FirstContentWrapper);
        assert!(targets.contains(&InlineTarget::Matching(class_contains("sidebar"))));
        assert!(!targets.contains(&InlineTarget::Matching(Matcher::Tag("main"))));
    }
}
