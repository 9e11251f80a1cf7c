use glam::{I64Vec3, Quat, Vec3};

/// Smallest precision accepted by the quantizer.
pub const MIN_PRECISION: f64 = 1e-4;

const QUATERNION_MIN_RANGE: f32 = -std::f32::consts::FRAC_1_SQRT_2;
const QUATERNION_MAX_RANGE: f32 = std::f32::consts::FRAC_1_SQRT_2;
const TEN_BITS_MAX: u32 = 0x3FF;

#[inline]
fn clamp_precision(precision: f64) -> f64 {
    if precision.is_finite() {
        precision.max(MIN_PRECISION)
    } else {
        MIN_PRECISION
    }
}

/// Rounds each axis onto the `precision` lattice.
pub fn quantize(value: Vec3, precision: f64) -> I64Vec3 {
    let precision = clamp_precision(precision);
    I64Vec3::new(
        (value.x as f64 / precision).round() as i64,
        (value.y as f64 / precision).round() as i64,
        (value.z as f64 / precision).round() as i64,
    )
}

pub fn dequantize(quantized: I64Vec3, precision: f64) -> Vec3 {
    let precision = clamp_precision(precision);
    Vec3::new(
        (quantized.x as f64 * precision) as f32,
        (quantized.y as f64 * precision) as f32,
        (quantized.z as f64 * precision) as f32,
    )
}

#[inline]
pub fn delta_encode(current: I64Vec3, last: I64Vec3) -> I64Vec3 {
    current - last
}

#[inline]
pub fn delta_decode(delta: I64Vec3, last: I64Vec3) -> I64Vec3 {
    delta + last
}

/// True when the receiver's reconstruction of `a` and `b` would differ.
pub fn quantized_changed(a: Vec3, b: Vec3, precision: f64) -> bool {
    quantize(a, precision) != quantize(b, precision)
}

/// True when the angle between `a` and `b` exceeds `sensitivity_degrees`.
pub fn rotation_changed(a: Quat, b: Quat, sensitivity_degrees: f32) -> bool {
    angle_between(a, b).to_degrees() > sensitivity_degrees
}

/// Angle in radians, exact zero for identical inputs. `Quat::angle_between`
/// goes through `acos` and reports small angles for equal rotations.
fn angle_between(a: Quat, b: Quat) -> f32 {
    let b = if a.dot(b) < 0.0 { -b } else { b };
    4.0 * (a - b).length().atan2((a + b).length())
}

fn scale_to_ten_bits(value: f32) -> u32 {
    let clamped = value.clamp(QUATERNION_MIN_RANGE, QUATERNION_MAX_RANGE);
    let ratio = (clamped - QUATERNION_MIN_RANGE) / (QUATERNION_MAX_RANGE - QUATERNION_MIN_RANGE);
    (ratio * TEN_BITS_MAX as f32).round() as u32
}

fn ten_bits_to_scale(bits: u32) -> f32 {
    let ratio = (bits & TEN_BITS_MAX) as f32 / TEN_BITS_MAX as f32;
    QUATERNION_MIN_RANGE + ratio * (QUATERNION_MAX_RANGE - QUATERNION_MIN_RANGE)
}

/// Smallest-three encoding: 2 bits for the index of the largest component,
/// 10 bits for each of the remaining three.
pub fn compress_rotation(rotation: Quat) -> u32 {
    let components = rotation.normalize().to_array();

    let mut largest_index = 0;
    for (i, component) in components.iter().enumerate() {
        if component.abs() > components[largest_index].abs() {
            largest_index = i;
        }
    }

    // q and -q are the same rotation, so the dropped component is always positive.
    let sign = if components[largest_index] < 0.0 { -1.0 } else { 1.0 };

    let mut packed = (largest_index as u32) << 30;
    let mut shift = 20;
    for (i, component) in components.iter().enumerate() {
        if i == largest_index {
            continue;
        }
        packed |= scale_to_ten_bits(component * sign) << shift;
        shift -= 10;
    }
    packed
}

pub fn decompress_rotation(packed: u32) -> Quat {
    let largest_index = (packed >> 30) as usize;
    let small = [
        ten_bits_to_scale(packed >> 20),
        ten_bits_to_scale(packed >> 10),
        ten_bits_to_scale(packed),
    ];

    let sum_squares: f32 = small.iter().map(|c| c * c).sum();
    let largest = (1.0 - sum_squares).max(0.0).sqrt();

    let mut components = [0.0f32; 4];
    let mut next = 0;
    for (i, component) in components.iter_mut().enumerate() {
        if i == largest_index {
            *component = largest;
        } else {
            *component = small[next];
            next += 1;
        }
    }

    Quat::from_array(components).normalize()
}
