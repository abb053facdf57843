//! Terminal styling helpers with NO_COLOR support.

/// Check if color output is allowed by the environment (respects `NO_COLOR`).
pub fn color_enabled() -> bool {
    std::env::var_os("NO_COLOR").is_none()
}

/// Terminal style helper that respects NO_COLOR.
#[derive(Debug, Clone, Copy)]
pub struct Style {
    enabled: bool,
}

impl Default for Style {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Style {
    /// Colors on if both the caller and the environment allow them.
    pub fn new(wanted: bool) -> Self {
        Self {
            enabled: wanted && color_enabled(),
        }
    }

    /// Create a style with colors explicitly enabled (for tests).
    pub fn force_enabled() -> Self {
        Self { enabled: true }
    }

    /// Create a style with colors explicitly disabled.
    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    fn code(&self, code: &'static str) -> &'static str {
        if self.enabled {
            code
        } else {
            ""
        }
    }

    pub fn dim_start(&self) -> &'static str {
        self.code("\x1b[2m")
    }

    pub fn bold_start(&self) -> &'static str {
        self.code("\x1b[1m")
    }

    pub fn red_start(&self) -> &'static str {
        self.code("\x1b[31m")
    }

    pub fn yellow_start(&self) -> &'static str {
        self.code("\x1b[33m")
    }

    pub fn green_start(&self) -> &'static str {
        self.code("\x1b[32m")
    }

    pub fn blue_start(&self) -> &'static str {
        self.code("\x1b[34m")
    }

    pub fn cyan_start(&self) -> &'static str {
        self.code("\x1b[36m")
    }

    pub fn reset(&self) -> &'static str {
        self.code("\x1b[0m")
    }
}

/// First `max` characters of `s`.
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Cut `s` to at most `max` characters, marking the cut with `...`.
pub fn ellipsize(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    if max <= 3 {
        return truncate_chars(s, max);
    }
    let mut out = truncate_chars(s, max - 3);
    out.push_str("...");
    out
}

/// Keep the first `max` lines of `s`. Returns the kept text and how many
/// lines were hidden.
pub fn clip_lines(s: &str, max: usize) -> (String, usize) {
    let total = s.lines().count();
    if total <= max {
        return (s.to_string(), 0);
    }
    let kept: Vec<&str> = s.lines().take(max).collect();
    (kept.join("\n"), total - max)
}
