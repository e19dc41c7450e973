use once_cell::sync::Lazy;
use regex::Regex;

static RGB_FN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^rgba?\(\s*([0-9.]+%?)\s*[, ]\s*([0-9.]+%?)\s*[, ]\s*([0-9.]+%?)\s*(?:[,/]\s*([0-9.]+%?)\s*)?\)$").unwrap()
});
static HSL_FN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^hsla?\(\s*([0-9.-]+)(?:deg)?\s*[, ]\s*([0-9.]+)%\s*[, ]\s*([0-9.]+)%\s*(?:[,/]\s*([0-9.]+%?)\s*)?\)$").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const TRANSPARENT: Color = Color {
        r: 0,
        g: 0,
        b: 0,
        a: 0.0,
    };

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub fn with_alpha(self, a: f32) -> Self {
        Self {
            a: a.clamp(0.0, 1.0),
            ..self
        }
    }

    /// Multiplies the existing alpha, clamping to [0, 1].
    pub fn scale_alpha(self, factor: f32) -> Self {
        self.with_alpha(self.a * factor)
    }

    pub fn is_opaque(self) -> bool {
        self.a >= 1.0
    }
}

/// Parses a CSS color value: #rgb, #rgba, #rrggbb, #rrggbbaa, rgb()/rgba(),
/// hsl()/hsla(), named colors, and `transparent`.
pub fn parse_color(value: &str) -> Option<Color> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Some(hex) = value.strip_prefix('#') {
        return parse_hex(hex);
    }
    if let Some(caps) = RGB_FN_RE.captures(value) {
        let r = parse_rgb_component(caps.get(1)?.as_str())?;
        let g = parse_rgb_component(caps.get(2)?.as_str())?;
        let b = parse_rgb_component(caps.get(3)?.as_str())?;
        let a = match caps.get(4) {
            Some(m) => parse_alpha_component(m.as_str())?,
            None => 1.0,
        };
        return Some(Color { r, g, b, a });
    }
    if let Some(caps) = HSL_FN_RE.captures(value) {
        let h: f32 = caps.get(1)?.as_str().parse().ok()?;
        let s: f32 = caps.get(2)?.as_str().parse().ok()?;
        let l: f32 = caps.get(3)?.as_str().parse().ok()?;
        let a = match caps.get(4) {
            Some(m) => parse_alpha_component(m.as_str())?,
            None => 1.0,
        };
        let (r, g, b) = hsl_to_rgb(h, s / 100.0, l / 100.0);
        return Some(Color { r, g, b, a });
    }
    let lower = value.to_ascii_lowercase();
    if lower == "transparent" {
        return Some(Color::TRANSPARENT);
    }
    named_color(&lower).map(|(r, g, b)| Color::rgb(r, g, b))
}

fn parse_hex(hex: &str) -> Option<Color> {
    let digits: Vec<u32> = hex.chars().map(|c| c.to_digit(16)).collect::<Option<_>>()?;
    match digits.len() {
        3 | 4 => {
            let r = (digits[0] * 17) as u8;
            let g = (digits[1] * 17) as u8;
            let b = (digits[2] * 17) as u8;
            let a = if digits.len() == 4 {
                (digits[3] * 17) as f32 / 255.0
            } else {
                1.0
            };
            Some(Color { r, g, b, a })
        }
        6 | 8 => {
            let r = (digits[0] * 16 + digits[1]) as u8;
            let g = (digits[2] * 16 + digits[3]) as u8;
            let b = (digits[4] * 16 + digits[5]) as u8;
            let a = if digits.len() == 8 {
                (digits[6] * 16 + digits[7]) as f32 / 255.0
            } else {
                1.0
            };
            Some(Color { r, g, b, a })
        }
        _ => None,
    }
}

fn parse_rgb_component(raw: &str) -> Option<u8> {
    if let Some(pct) = raw.strip_suffix('%') {
        let value: f32 = pct.parse().ok()?;
        return Some((value / 100.0 * 255.0).round().clamp(0.0, 255.0) as u8);
    }
    let value: f32 = raw.parse().ok()?;
    Some(value.round().clamp(0.0, 255.0) as u8)
}

fn parse_alpha_component(raw: &str) -> Option<f32> {
    if let Some(pct) = raw.strip_suffix('%') {
        let value: f32 = pct.parse().ok()?;
        return Some((value / 100.0).clamp(0.0, 1.0));
    }
    let value: f32 = raw.parse().ok()?;
    Some(value.clamp(0.0, 1.0))
}

fn hsl_to_rgb(h: f32, s: f32, l: f32) -> (u8, u8, u8) {
    let h = h.rem_euclid(360.0) / 360.0;
    let s = s.clamp(0.0, 1.0);
    let l = l.clamp(0.0, 1.0);
    if s == 0.0 {
        let v = (l * 255.0).round() as u8;
        return (v, v, v);
    }
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    let channel = |t: f32| {
        let t = t.rem_euclid(1.0);
        let v = if t < 1.0 / 6.0 {
            p + (q - p) * 6.0 * t
        } else if t < 0.5 {
            q
        } else if t < 2.0 / 3.0 {
            p + (q - p) * (2.0 / 3.0 - t) * 6.0
        } else {
            p
        };
        (v * 255.0).round().clamp(0.0, 255.0) as u8
    };
    (
        channel(h + 1.0 / 3.0),
        channel(h),
        channel(h - 1.0 / 3.0),
    )
}

fn named_color(name: &str) -> Option<(u8, u8, u8)> {
    let rgb = match name {
        "aliceblue" => (240, 248, 255),
        "antiquewhite" => (250, 235, 215),
        "aqua" | "cyan" => (0, 255, 255),
        "aquamarine" => (127, 255, 212),
        "azure" => (240, 255, 255),
        "beige" => (245, 245, 220),
        "bisque" => (255, 228, 196),
        "black" => (0, 0, 0),
        "blanchedalmond" => (255, 235, 205),
        "blue" => (0, 0, 255),
        "blueviolet" => (138, 43, 226),
        "brown" => (165, 42, 42),
        "burlywood" => (222, 184, 135),
        "cadetblue" => (95, 158, 160),
        "chartreuse" => (127, 255, 0),
        "chocolate" => (210, 105, 30),
        "coral" => (255, 127, 80),
        "cornflowerblue" => (100, 149, 237),
        "cornsilk" => (255, 248, 220),
        "crimson" => (220, 20, 60),
        "darkblue" => (0, 0, 139),
        "darkcyan" => (0, 139, 139),
        "darkgoldenrod" => (184, 134, 11),
        "darkgray" | "darkgrey" => (169, 169, 169),
        "darkgreen" => (0, 100, 0),
        "darkkhaki" => (189, 183, 107),
        "darkmagenta" => (139, 0, 139),
        "darkolivegreen" => (85, 107, 47),
        "darkorange" => (255, 140, 0),
        "darkorchid" => (153, 50, 204),
        "darkred" => (139, 0, 0),
        "darksalmon" => (233, 150, 122),
        "darkseagreen" => (143, 188, 143),
        "darkslateblue" => (72, 61, 139),
        "darkslategray" | "darkslategrey" => (47, 79, 79),
        "darkturquoise" => (0, 206, 209),
        "darkviolet" => (148, 0, 211),
        "deeppink" => (255, 20, 147),
        "deepskyblue" => (0, 191, 255),
        "dimgray" | "dimgrey" => (105, 105, 105),
        "dodgerblue" => (30, 144, 255),
        "firebrick" => (178, 34, 34),
        "floralwhite" => (255, 250, 240),
        "forestgreen" => (34, 139, 34),
        "fuchsia" | "magenta" => (255, 0, 255),
        "gainsboro" => (220, 220, 220),
        "ghostwhite" => (248, 248, 255),
        "gold" => (255, 215, 0),
        "goldenrod" => (218, 165, 32),
        "gray" | "grey" => (128, 128, 128),
        "green" => (0, 128, 0),
        "greenyellow" => (173, 255, 47),
        "honeydew" => (240, 255, 240),
        "hotpink" => (255, 105, 180),
        "indianred" => (205, 92, 92),
        "indigo" => (75, 0, 130),
        "ivory" => (255, 255, 240),
        "khaki" => (240, 230, 140),
        "lavender" => (230, 230, 250),
        "lavenderblush" => (255, 240, 245),
        "lawngreen" => (124, 252, 0),
        "lemonchiffon" => (255, 250, 205),
        "lightblue" => (173, 216, 230),
        "lightcoral" => (240, 128, 128),
        "lightcyan" => (224, 255, 255),
        "lightgoldenrodyellow" => (250, 250, 210),
        "lightgray" | "lightgrey" => (211, 211, 211),
        "lightgreen" => (144, 238, 144),
        "lightpink" => (255, 182, 193),
        "lightsalmon" => (255, 160, 122),
        "lightseagreen" => (32, 178, 170),
        "lightskyblue" => (135, 206, 250),
        "lightslategray" | "lightslategrey" => (119, 136, 153),
        "lightsteelblue" => (176, 196, 222),
        "lightyellow" => (255, 255, 224),
        "lime" => (0, 255, 0),
        "limegreen" => (50, 205, 50),
        "linen" => (250, 240, 230),
        "maroon" => (128, 0, 0),
        "mediumaquamarine" => (102, 205, 170),
        "mediumblue" => (0, 0, 205),
        "mediumorchid" => (186, 85, 211),
        "mediumpurple" => (147, 112, 219),
        "mediumseagreen" => (60, 179, 113),
        "mediumslateblue" => (123, 104, 238),
        "mediumspringgreen" => (0, 250, 154),
        "mediumturquoise" => (72, 209, 204),
        "mediumvioletred" => (199, 21, 133),
        "midnightblue" => (25, 25, 112),
        "mintcream" => (245, 255, 250),
        "mistyrose" => (255, 228, 225),
        "moccasin" => (255, 228, 181),
        "navajowhite" => (255, 222, 173),
        "navy" => (0, 0, 128),
        "oldlace" => (253, 245, 230),
        "olive" => (128, 128, 0),
        "olivedrab" => (107, 142, 35),
        "orange" => (255, 165, 0),
        "orangered" => (255, 69, 0),
        "orchid" => (218, 112, 214),
        "palegoldenrod" => (238, 232, 170),
        "palegreen" => (152, 251, 152),
        "paleturquoise" => (175, 238, 238),
        "palevioletred" => (219, 112, 147),
        "papayawhip" => (255, 239, 213),
        "peachpuff" => (255, 218, 185),
        "peru" => (205, 133, 63),
        "pink" => (255, 192, 203),
        "plum" => (221, 160, 221),
        "powderblue" => (176, 224, 230),
        "purple" => (128, 0, 128),
        "rebeccapurple" => (102, 51, 153),
        "red" => (255, 0, 0),
        "rosybrown" => (188, 143, 143),
        "royalblue" => (65, 105, 225),
        "saddlebrown" => (139, 69, 19),
        "salmon" => (250, 128, 114),
        "sandybrown" => (244, 164, 96),
        "seagreen" => (46, 139, 87),
        "seashell" => (255, 245, 238),
        "sienna" => (160, 82, 45),
        "silver" => (192, 192, 192),
        "skyblue" => (135, 206, 235),
        "slateblue" => (106, 90, 205),
        "slategray" | "slategrey" => (112, 128, 144),
        "snow" => (255, 250, 250),
        "springgreen" => (0, 255, 127),
        "steelblue" => (70, 130, 180),
        "tan" => (210, 180, 140),
        "teal" => (0, 128, 128),
        "thistle" => (216, 191, 216),
        "tomato" => (255, 99, 71),
        "turquoise" => (64, 224, 208),
        "violet" => (238, 130, 238),
        "wheat" => (245, 222, 179),
        "white" => (255, 255, 255),
        "whitesmoke" => (245, 245, 245),
        "yellow" => (255, 255, 0),
        "yellowgreen" => (154, 205, 50),
        _ => return None,
    };
    Some(rgb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_forms() {
        assert_eq!(parse_color("#f00"), Some(Color::rgb(255, 0, 0)));
        assert_eq!(parse_color("#ff0000"), Some(Color::rgb(255, 0, 0)));
        let with_alpha = parse_color("#ff000080").unwrap();
        assert_eq!((with_alpha.r, with_alpha.g, with_alpha.b), (255, 0, 0));
        assert!((with_alpha.a - 128.0 / 255.0).abs() < 1e-4);
    }

    #[test]
    fn parses_rgb_functions() {
        assert_eq!(parse_color("rgb(0, 128, 255)"), Some(Color::rgb(0, 128, 255)));
        assert_eq!(parse_color("rgb(100%, 0%, 0%)"), Some(Color::rgb(255, 0, 0)));
        let rgba = parse_color("rgba(10, 20, 30, 0.5)").unwrap();
        assert_eq!((rgba.r, rgba.g, rgba.b), (10, 20, 30));
        assert!((rgba.a - 0.5).abs() < 1e-6);
    }

    #[test]
    fn parses_hsl_and_named() {
        assert_eq!(parse_color("hsl(0, 100%, 50%)"), Some(Color::rgb(255, 0, 0)));
        assert_eq!(parse_color("rebeccapurple"), Some(Color::rgb(102, 51, 153)));
        assert_eq!(parse_color("Transparent"), Some(Color::TRANSPARENT));
        assert_eq!(parse_color("not-a-color"), None);
    }
}
