// Attractor colour engine: one deterministic blend step used by both the
// idle animation and the "next illustration colour" preview.

use std::collections::HashSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Rgb { r, g, b }
    }
}

/// The six named pulls a colour sample can drift toward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EqType {
    User,
    Bby,
    Red,
    Green,
    Blue,
    Rainbow,
}

pub struct StepContext {
    pub active_eqs: HashSet<EqType>,
    pub user_colour: Rgb,
    pub bby_colour: Rgb,
    pub tempo: f64,

    /// Influence weights, 0..=100 each.
    pub user_influence: f64,
    pub bby_influence: f64,
    pub red_influence: f64,
    pub green_influence: f64,
    pub blue_influence: f64,
    pub rainbow_influence: f64,

    pub base_step: f64,
    pub rainbow_hue_step: f64,
}

impl Default for StepContext {
    fn default() -> Self {
        StepContext {
            active_eqs: HashSet::new(),
            user_colour: Rgb::new(133, 239, 238),
            bby_colour: Rgb::new(133, 239, 238),
            tempo: 120.0,
            user_influence: 0.0,
            bby_influence: 0.0,
            red_influence: 0.0,
            green_influence: 0.0,
            blue_influence: 0.0,
            rainbow_influence: 0.0,
            base_step: 0.08,
            rainbow_hue_step: 20.0,
        }
    }
}

pub fn clamp_byte(x: f64) -> u8 {
    x.round().clamp(0.0, 255.0) as u8
}

pub fn hex_to_rgb(hx: &str) -> Option<Rgb> {
    let h = hx.trim_start_matches('#');
    let h: String = if h.len() == 3 {
        h.chars().flat_map(|c| [c, c]).collect()
    } else {
        h.to_string()
    };
    if h.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&h[0..2], 16).ok()?;
    let g = u8::from_str_radix(&h[2..4], 16).ok()?;
    let b = u8::from_str_radix(&h[4..6], 16).ok()?;
    Some(Rgb::new(r, g, b))
}

pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (f64, f64, f64) {
    let r = r as f64 / 255.0;
    let g = g as f64 / 255.0;
    let b = b as f64 / 255.0;
    let mx = r.max(g).max(b);
    let mn = r.min(g).min(b);
    let d = mx - mn;
    let mut h = 0.0;
    if d > 0.0 {
        h = if mx == r {
            ((g - b) / d).rem_euclid(6.0)
        } else if mx == g {
            (b - r) / d + 2.0
        } else {
            (r - g) / d + 4.0
        };
        h *= 60.0;
        if h < 0.0 {
            h += 360.0;
        }
    }
    let s = if mx == 0.0 { 0.0 } else { d / mx };
    (h, s, mx)
}

pub fn hsv_to_rgb(h: f64, s: f64, v: f64) -> Rgb {
    let c = v * s;
    let mut h = h % 360.0;
    if h < 0.0 {
        h += 360.0;
    }
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;
    let (r, g, b) = if h < 60.0 {
        (c, x, 0.0)
    } else if h < 120.0 {
        (x, c, 0.0)
    } else if h < 180.0 {
        (0.0, c, x)
    } else if h < 240.0 {
        (0.0, x, c)
    } else if h < 300.0 {
        (x, 0.0, c)
    } else {
        (c, 0.0, x)
    };
    Rgb::new(
        clamp_byte((r + m) * 255.0),
        clamp_byte((g + m) * 255.0),
        clamp_byte((b + m) * 255.0),
    )
}

/// One deterministic attractor step. Each active pull contributes a
/// per-channel delta toward its target, scaled by weight/100; the summed
/// delta is applied at base_step * tempo/120 and clamped back to bytes.
/// The rainbow pull re-derives its target from the sample's own hue so it
/// always points somewhere genuinely different.
pub fn step_colour_once(c: Rgb, ctx: &StepContext) -> Rgb {
    let step = ctx.base_step * (ctx.tempo / 120.0);

    let (h, s, v) = rgb_to_hsv(c.r, c.g, c.b);
    let rainbow_target = hsv_to_rgb((h + ctx.rainbow_hue_step) % 360.0, s, v);

    let cr = c.r as f64;
    let cg = c.g as f64;
    let cb = c.b as f64;

    let mut dr = 0.0;
    let mut dg = 0.0;
    let mut db = 0.0;

    let mut pull = |target: (f64, f64, f64), weight: f64| {
        let w = weight / 100.0;
        dr += (target.0 - cr) * w;
        dg += (target.1 - cg) * w;
        db += (target.2 - cb) * w;
    };

    if ctx.active_eqs.contains(&EqType::User) {
        let u = ctx.user_colour;
        pull((u.r as f64, u.g as f64, u.b as f64), ctx.user_influence);
    }
    if ctx.active_eqs.contains(&EqType::Bby) {
        let t = ctx.bby_colour;
        pull((t.r as f64, t.g as f64, t.b as f64), ctx.bby_influence);
    }
    if ctx.active_eqs.contains(&EqType::Red) {
        pull((255.0, 0.0, 0.0), ctx.red_influence);
    }
    if ctx.active_eqs.contains(&EqType::Green) {
        pull((0.0, 255.0, 0.0), ctx.green_influence);
    }
    if ctx.active_eqs.contains(&EqType::Blue) {
        pull((0.0, 0.0, 255.0), ctx.blue_influence);
    }
    if ctx.active_eqs.contains(&EqType::Rainbow) {
        let t = rainbow_target;
        pull((t.r as f64, t.g as f64, t.b as f64), ctx.rainbow_influence);
    }

    Rgb::new(
        clamp_byte(cr + dr * step),
        clamp_byte(cg + dg * step),
        clamp_byte(cb + db * step),
    )
}

/// Next n samples from a seed colour under a fixed context.
pub fn compute_next_colours(n: usize, start: Rgb, ctx: &StepContext) -> Vec<Rgb> {
    let mut c = start;
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        c = step_colour_once(c, ctx);
        out.push(c);
    }
    out
}

/// Fractional colour used by the easing loop; the authoritative target can
/// jump but the displayed colour glides.
#[derive(Clone, Copy, Debug)]
pub struct FloatColour {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl FloatColour {
    pub fn from_rgb(c: Rgb) -> Self {
        FloatColour { r: c.r as f64, g: c.g as f64, b: c.b as f64 }
    }

    pub fn rounded(&self) -> Rgb {
        Rgb::new(clamp_byte(self.r), clamp_byte(self.g), clamp_byte(self.b))
    }

    /// One frame of exponential smoothing toward target. Rates differ per
    /// channel on purpose, the drift looks more alive when green lags.
    pub fn ease_toward(&mut self, target: Rgb) {
        self.r += (target.r as f64 - self.r) * 0.02;
        self.g += (target.g as f64 - self.g) * 0.01;
        self.b += (target.b as f64 - self.b) * 0.02;
    }
}

/// border = bubble background knocked down 30 per channel.
pub fn darken(c: Rgb, amount: u8) -> Rgb {
    Rgb::new(
        c.r.saturating_sub(amount),
        c.g.saturating_sub(amount),
        c.b.saturating_sub(amount),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_active() -> HashSet<EqType> {
        [
            EqType::User,
            EqType::Bby,
            EqType::Red,
            EqType::Green,
            EqType::Blue,
            EqType::Rainbow,
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn channels_stay_clamped_under_heavy_pull() {
        let ctx = StepContext {
            active_eqs: all_active(),
            user_colour: Rgb::new(255, 255, 255),
            bby_colour: Rgb::new(0, 0, 0),
            tempo: 480.0,
            user_influence: 100.0,
            bby_influence: 100.0,
            red_influence: 100.0,
            green_influence: 100.0,
            blue_influence: 100.0,
            rainbow_influence: 100.0,
            ..StepContext::default()
        };
        let mut c = Rgb::new(7, 250, 130);
        for _ in 0..500 {
            // clamp_byte saturates before the u8 cast; an overflow here
            // would panic in debug builds
            c = step_colour_once(c, &ctx);
        }
        let _ = c;
    }

    #[test]
    fn zero_weights_leave_colour_alone() {
        let ctx = StepContext { active_eqs: all_active(), ..StepContext::default() };
        let c = Rgb::new(90, 140, 40);
        assert_eq!(step_colour_once(c, &ctx), c);
    }

    #[test]
    fn inactive_eqs_contribute_nothing() {
        let ctx = StepContext {
            red_influence: 100.0,
            green_influence: 100.0,
            ..StepContext::default()
        };
        let c = Rgb::new(90, 140, 40);
        assert_eq!(step_colour_once(c, &ctx), c);
    }

    #[test]
    fn red_pull_drives_toward_pure_red() {
        let mut ctx = StepContext::default();
        ctx.active_eqs.insert(EqType::Red);
        ctx.red_influence = 100.0;
        let mut c = Rgb::new(10, 200, 200);
        for _ in 0..2000 {
            c = step_colour_once(c, &ctx);
        }
        assert!(c.r > 250);
        assert!(c.g < 5);
        assert!(c.b < 5);
    }

    #[test]
    fn rainbow_target_differs_from_sample() {
        let c = Rgb::new(200, 40, 40);
        let (h, s, v) = rgb_to_hsv(c.r, c.g, c.b);
        let t = hsv_to_rgb((h + 20.0) % 360.0, s, v);
        assert_ne!(t, c);
    }

    #[test]
    fn preview_is_deterministic() {
        let mut ctx = StepContext::default();
        ctx.active_eqs.insert(EqType::Rainbow);
        ctx.rainbow_influence = 60.0;
        let seed = Rgb::new(133, 239, 238);
        let a = compute_next_colours(16, seed, &ctx);
        let b = compute_next_colours(16, seed, &ctx);
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn hsv_round_trip_on_primaries() {
        for c in [
            Rgb::new(255, 0, 0),
            Rgb::new(0, 255, 0),
            Rgb::new(0, 0, 255),
            Rgb::new(255, 255, 255),
            Rgb::new(0, 0, 0),
        ] {
            let (h, s, v) = rgb_to_hsv(c.r, c.g, c.b);
            assert_eq!(hsv_to_rgb(h, s, v), c);
        }
    }

    #[test]
    fn hex_parsing() {
        assert_eq!(hex_to_rgb("#85efee"), Some(Rgb::new(133, 239, 238)));
        assert_eq!(hex_to_rgb("fff"), Some(Rgb::new(255, 255, 255)));
        assert_eq!(hex_to_rgb("#12345"), None);
        assert_eq!(hex_to_rgb("gggggg"), None);
    }

    #[test]
    fn easing_converges_on_target() {
        let mut cur = FloatColour::from_rgb(Rgb::new(0, 0, 0));
        let target = Rgb::new(133, 239, 238);
        for _ in 0..3000 {
            cur.ease_toward(target);
        }
        assert_eq!(cur.rounded(), target);
    }
}
