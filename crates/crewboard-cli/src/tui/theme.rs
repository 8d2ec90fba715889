use crate::config::ThemeConfig;
use ratatui::style::Color;

#[derive(Debug, Clone, Copy)]
pub struct Theme {
    pub border: Color,
    pub text: Color,
    pub accent: Color,
}

impl Theme {
    pub fn from_config(cfg: &ThemeConfig) -> Self {
        Self {
            border: parse_hex(&cfg.border).unwrap_or(Color::Cyan),
            text: parse_hex(&cfg.text).unwrap_or(Color::Gray),
            accent: parse_hex(&cfg.accent).unwrap_or(Color::Yellow),
        }
    }
}

fn parse_hex(value: &str) -> Option<Color> {
    let hex = value.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some(Color::Rgb(r, g, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_parses_and_bad_input_falls_back() {
        assert_eq!(parse_hex("#4a9a8a"), Some(Color::Rgb(0x4a, 0x9a, 0x8a)));
        assert_eq!(parse_hex("4a9a8a"), None);
        assert_eq!(parse_hex("#xyzxyz"), None);
        assert_eq!(parse_hex("#fff"), None);
    }
}
