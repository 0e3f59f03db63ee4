// src/color.rs
//! Small color helpers shared by patterns.

/// Clamps `v` into `lo..=hi`.
pub fn clamp(v: f64, lo: f64, hi: f64) -> f64 {
    v.max(lo).min(hi)
}

/// Linearly maps `v` from `[in_lo, in_hi]` to `[out_lo, out_hi]`. Not clamped.
pub fn remap(v: f64, in_lo: f64, in_hi: f64, out_lo: f64, out_hi: f64) -> f64 {
    if in_hi == in_lo {
        return out_lo;
    }
    (v - in_lo) / (in_hi - in_lo) * (out_hi - out_lo) + out_lo
}

/// Converts a channel in `0.0..=1.0` to a byte, clamping out-of-range input.
pub fn float_to_byte(v: f64) -> u8 {
    (clamp(v, 0.0, 1.0) * 255.0).round() as u8
}

/// Linear RGB triple, each channel nominally in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rgb {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(1.0, 1.0, 1.0);

    pub const fn new(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }

    /// HSV to RGB. `h` wraps around `0.0..1.0`; `s` and `v` are clamped.
    pub fn from_hsv(h: f64, s: f64, v: f64) -> Self {
        let h = h.rem_euclid(1.0) * 6.0;
        let s = clamp(s, 0.0, 1.0);
        let v = clamp(v, 0.0, 1.0);
        let sector = h.floor();
        let f = h - sector;
        let p = v * (1.0 - s);
        let q = v * (1.0 - s * f);
        let t = v * (1.0 - s * (1.0 - f));
        match sector as u8 {
            0 => Rgb::new(v, t, p),
            1 => Rgb::new(q, v, p),
            2 => Rgb::new(p, v, t),
            3 => Rgb::new(p, q, v),
            4 => Rgb::new(t, p, v),
            _ => Rgb::new(v, p, q),
        }
    }

    pub fn scale(self, k: f64) -> Self {
        Rgb::new(self.r * k, self.g * k, self.b * k)
    }

    /// Writes the color into a 3-byte pixel slot.
    pub fn write_to(self, pixel: &mut [u8]) {
        pixel[0] = float_to_byte(self.r);
        pixel[1] = float_to_byte(self.g);
        pixel[2] = float_to_byte(self.b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_should_convert_floats_to_bytes_with_clamping() {
        assert_eq!(float_to_byte(-0.5), 0);
        assert_eq!(float_to_byte(0.0), 0);
        assert_eq!(float_to_byte(0.5), 128);
        assert_eq!(float_to_byte(1.0), 255);
        assert_eq!(float_to_byte(3.0), 255);
    }

    #[test]
    fn it_should_remap_ranges() {
        assert_eq!(remap(5.0, 0.0, 10.0, 100.0, 200.0), 150.0);
        assert_eq!(remap(1.0, 1.0, 1.0, 3.0, 4.0), 3.0);
    }

    #[test]
    fn it_should_convert_primary_hues() {
        assert_eq!(Rgb::from_hsv(0.0, 1.0, 1.0), Rgb::new(1.0, 0.0, 0.0));
        assert_eq!(Rgb::from_hsv(1.0, 1.0, 1.0), Rgb::new(1.0, 0.0, 0.0));
        let green = Rgb::from_hsv(1.0 / 3.0, 1.0, 1.0);
        assert!(green.g > 0.999 && green.r < 1e-9 && green.b < 1e-9, "{:?}", green);
    }
}
