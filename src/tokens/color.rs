//! Color literals: parsing, formatting, luminance.
//!
//! Accepts `#rgb`, `#rrggbb`, `#rrggbbaa`, `rgb()`, `rgba()`, `hsl()`, `hsla()`
//! and a small set of named colors. Channels are 8-bit sRGB; alpha is 0..=1.

/// An sRGB color with alpha.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f64,
}

pub const WHITE: Rgba = Rgba::rgb(255, 255, 255);
pub const BLACK: Rgba = Rgba::rgb(0, 0, 0);

/// Luminance above which black text contrasts better than white.
///
/// (L + 0.05) / 0.05 == 1.05 / (L + 0.05) solves to L ≈ 0.179.
const CONTRAST_THRESHOLD: f64 = 0.179;

const NAMED: &[(&str, Rgba)] = &[
    ("black", Rgba::rgb(0, 0, 0)),
    ("white", Rgba::rgb(255, 255, 255)),
    ("red", Rgba::rgb(255, 0, 0)),
    ("green", Rgba::rgb(0, 128, 0)),
    ("lime", Rgba::rgb(0, 255, 0)),
    ("blue", Rgba::rgb(0, 0, 255)),
    ("yellow", Rgba::rgb(255, 255, 0)),
    ("cyan", Rgba::rgb(0, 255, 255)),
    ("magenta", Rgba::rgb(255, 0, 255)),
    ("gray", Rgba::rgb(128, 128, 128)),
    ("grey", Rgba::rgb(128, 128, 128)),
    ("silver", Rgba::rgb(192, 192, 192)),
    ("orange", Rgba::rgb(255, 165, 0)),
    ("purple", Rgba::rgb(128, 0, 128)),
    ("navy", Rgba::rgb(0, 0, 128)),
    ("transparent", Rgba {
        r: 0,
        g: 0,
        b: 0,
        a: 0.0,
    }),
];

impl Rgba {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// Parse any supported color literal. Returns `None` for anything else.
    pub fn parse(text: &str) -> Option<Self> {
        let s = text.trim();
        if let Some(hex) = s.strip_prefix('#') {
            return parse_hex(hex);
        }
        let lower = s.to_ascii_lowercase();
        if let Some((name, args)) = split_call(&lower) {
            let nums: Vec<f64> = args
                .split(',')
                .map(|a| a.trim().trim_end_matches('%').parse::<f64>())
                .collect::<Result<_, _>>()
                .ok()?;
            return match (name, nums.as_slice()) {
                ("rgb", [r, g, b]) => Some(Self::from_channels(*r, *g, *b, 1.0)?),
                ("rgba", [r, g, b, a]) => Some(Self::from_channels(*r, *g, *b, *a)?),
                ("hsl", [h, sat, l]) => Some(from_hsl(*h, *sat / 100.0, *l / 100.0, 1.0)),
                ("hsla", [h, sat, l, a]) => {
                    Some(from_hsl(*h, *sat / 100.0, *l / 100.0, a.clamp(0.0, 1.0)))
                }
                _ => None,
            };
        }
        NAMED.iter().find(|(n, _)| *n == lower).map(|(_, c)| *c)
    }

    fn from_channels(r: f64, g: f64, b: f64, a: f64) -> Option<Self> {
        let in_range = |v: f64| (0.0..=255.0).contains(&v);
        if !(in_range(r) && in_range(g) && in_range(b)) || !(0.0..=1.0).contains(&a) {
            return None;
        }
        Some(Self {
            r: r.round() as u8,
            g: g.round() as u8,
            b: b.round() as u8,
            a,
        })
    }

    /// `#rrggbb` when opaque, `rgba(r, g, b, a)` otherwise.
    pub fn to_css(&self) -> String {
        if self.a >= 1.0 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("rgba({}, {}, {}, {})", self.r, self.g, self.b, self.a)
        }
    }

    /// WCAG 2.1 relative luminance in [0, 1].
    pub fn relative_luminance(&self) -> f64 {
        let lin = |c: u8| {
            let c = f64::from(c) / 255.0;
            if c <= 0.040_45 {
                c / 12.92
            } else {
                ((c + 0.055) / 1.055).powf(2.4)
            }
        };
        0.2126 * lin(self.r) + 0.7152 * lin(self.g) + 0.0722 * lin(self.b)
    }

    /// Per-channel linear interpolation; `weight` 0 → self, 1 → other.
    pub fn mix(&self, other: &Rgba, weight: f64) -> Rgba {
        let w = weight.clamp(0.0, 1.0);
        let lerp = |a: u8, b: u8| {
            let (a, b) = (f64::from(a), f64::from(b));
            (a + (b - a) * w).round().clamp(0.0, 255.0) as u8
        };
        Rgba {
            r: lerp(self.r, other.r),
            g: lerp(self.g, other.g),
            b: lerp(self.b, other.b),
            a: self.a + (other.a - self.a) * w,
        }
    }

    pub fn lighten(&self, amount: f64) -> Rgba {
        let mut out = self.mix(&WHITE, amount);
        out.a = self.a;
        out
    }

    pub fn darken(&self, amount: f64) -> Rgba {
        let mut out = self.mix(&BLACK, amount);
        out.a = self.a;
        out
    }

    pub fn invert(&self) -> Rgba {
        Rgba {
            r: 255 - self.r,
            g: 255 - self.g,
            b: 255 - self.b,
            a: self.a,
        }
    }

    /// White or black, whichever contrasts more with `self`.
    pub fn contrast(&self) -> Rgba {
        if self.relative_luminance() > CONTRAST_THRESHOLD {
            BLACK
        } else {
            WHITE
        }
    }
}

/// Whether `text` is a recognizable color literal.
pub fn is_color(text: &str) -> bool {
    Rgba::parse(text).is_some()
}

fn parse_hex(hex: &str) -> Option<Rgba> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let byte = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        3 => {
            let d: Vec<u8> = hex
                .chars()
                .map(|c| byte(&format!("{c}{c}")))
                .collect::<Option<_>>()?;
            Some(Rgba::rgb(d[0], d[1], d[2]))
        }
        6 | 8 => {
            let r = byte(&hex[0..2])?;
            let g = byte(&hex[2..4])?;
            let b = byte(&hex[4..6])?;
            let a = if hex.len() == 8 {
                f64::from(byte(&hex[6..8])?) / 255.0
            } else {
                1.0
            };
            Some(Rgba { r, g, b, a })
        }
        _ => None,
    }
}

fn split_call(s: &str) -> Option<(&str, &str)> {
    let open = s.find('(')?;
    let inner = s[open + 1..].strip_suffix(')')?;
    Some((s[..open].trim(), inner))
}

fn from_hsl(h: f64, s: f64, l: f64, a: f64) -> Rgba {
    let s = s.clamp(0.0, 1.0);
    let l = l.clamp(0.0, 1.0);
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let hp = h.rem_euclid(360.0) / 60.0;
    let x = c * (1.0 - (hp % 2.0 - 1.0).abs());
    let (r1, g1, b1) = match hp as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = l - c / 2.0;
    let to8 = |v: f64| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba {
        r: to8(r1),
        g: to8(g1),
        b: to8(b1),
        a,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_forms() {
        assert_eq!(Rgba::parse("#ff0000"), Some(Rgba::rgb(255, 0, 0)));
        assert_eq!(Rgba::parse("#f0a"), Some(Rgba::rgb(255, 0, 170)));
        assert!(Rgba::parse("#gg0000").is_none());
        assert!(Rgba::parse("#12345").is_none());
    }

    #[test]
    fn parses_functional_forms() {
        assert_eq!(Rgba::parse("rgb(0, 255, 0)"), Some(Rgba::rgb(0, 255, 0)));
        let c = Rgba::parse("rgba(0, 0, 255, 0.5)").unwrap();
        assert_eq!((c.b, c.a), (255, 0.5));
        assert_eq!(Rgba::parse("hsl(120, 100%, 50%)"), Some(Rgba::rgb(0, 255, 0)));
        assert!(Rgba::parse("rgb(300, 0, 0)").is_none());
    }

    #[test]
    fn named_and_invalid() {
        assert_eq!(Rgba::parse("red").unwrap().to_css(), "#ff0000");
        assert!(Rgba::parse("invalid").is_none());
    }

    #[test]
    fn contrast_picks_extremes() {
        assert_eq!(BLACK.contrast(), WHITE);
        assert_eq!(WHITE.contrast(), BLACK);
        assert_eq!(Rgba::rgb(255, 255, 0).contrast(), BLACK);
        assert_eq!(Rgba::rgb(0, 0, 128).contrast(), WHITE);
    }

    #[test]
    fn lighten_and_darken_move_channels() {
        let base = Rgba::rgb(100, 150, 200);
        let lighter = base.lighten(0.2);
        assert!(lighter.r > base.r && lighter.g > base.g && lighter.b > base.b);
        let darker = base.darken(0.2);
        assert!(darker.r < base.r && darker.g < base.g && darker.b < base.b);
        assert_eq!(base.lighten(0.0), base);
    }

    #[test]
    fn mix_midpoint() {
        let mixed = Rgba::rgb(255, 0, 0).mix(&Rgba::rgb(0, 0, 255), 0.5);
        assert_eq!((mixed.r, mixed.g, mixed.b), (128, 0, 128));
    }
}
