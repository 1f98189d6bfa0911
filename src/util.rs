pub mod math {
    pub fn degree_to_radian(degree: f32) -> f32 {
        degree * std::f32::consts::PI / 180.0
    }

    /// Integer ceiling division, used for dispatch extents.
    pub fn ceil_div(value: u32, divisor: u32) -> u32 {
        (value + divisor - 1) / divisor
    }
}

pub mod color {
    /// Convert an HSV triple (all channels in [0, 1]) to RGB.
    pub fn hsv_to_rgb(hue: f32, saturation: f32, value: f32) -> glam::Vec3 {
        let sector = (hue * 6.0).rem_euclid(6.0);
        let i = sector.floor();
        let f = sector - i;
        let p = value * (1.0 - saturation);
        let q = value * (1.0 - saturation * f);
        let t = value * (1.0 - saturation * (1.0 - f));

        let (r, g, b) = match i as u32 {
            0 => (value, t, p),
            1 => (q, value, p),
            2 => (p, value, t),
            3 => (p, q, value),
            4 => (t, p, value),
            _ => (value, p, q),
        };
        glam::Vec3::new(r, g, b)
    }
}

#[cfg(test)]
mod tests {
    use super::color::hsv_to_rgb;
    use super::math::ceil_div;

    #[test]
    fn test_ceil_div() {
        assert_eq!(ceil_div(16, 8), 2);
        assert_eq!(ceil_div(17, 8), 3);
        assert_eq!(ceil_div(1279, 8), 160);
        assert_eq!(ceil_div(1, 8), 1);
    }

    #[test]
    fn test_hsv_primaries() {
        assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), glam::Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(hsv_to_rgb(1.0 / 3.0, 1.0, 1.0), glam::Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(hsv_to_rgb(2.0 / 3.0, 1.0, 1.0), glam::Vec3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_hsv_zero_saturation_is_gray() {
        let c = hsv_to_rgb(0.42, 0.0, 0.6);
        assert_eq!(c.x, 0.6);
        assert_eq!(c.y, 0.6);
        assert_eq!(c.z, 0.6);
    }
}
