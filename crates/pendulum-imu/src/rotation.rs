//! Rotation helpers for the orientation filter.
//!
//! Matrices follow the Android sensor conventions: device frame with X to the
//! right, Y up the screen and Z out of the screen; the world frame is East,
//! North, Up. Orientation triples are `[azimuth, pitch, roll]` in radians.
//! Where a helper talks about `[f32; 9]` the layout is row-major.

use glam::{Mat3, Quat, Vec3};

/// Below this angular speed (rad/s) a gyroscope reading is treated as no rotation.
pub const GYRO_EPSILON: f32 = 1e-9;

/// Accelerometer readings weaker than 10% of standard gravity are free fall.
const FREE_FALL_GRAVITY_SQUARED: f32 = 0.01 * 9.806_65 * 9.806_65;

/// Minimum magnitude of east = magnetic x gravity for a usable heading reference.
const MIN_EAST_NORM: f32 = 0.1;

/// Euler orientation in radians.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EulerAngles {
    /// Rotation about -Z (heading).
    pub azimuth: f32,
    /// Rotation about X.
    pub pitch: f32,
    /// Rotation about Y.
    pub roll: f32,
}

impl EulerAngles {
    pub fn new(azimuth: f32, pitch: f32, roll: f32) -> Self {
        Self {
            azimuth,
            pitch,
            roll,
        }
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.azimuth, self.pitch, self.roll]
    }

    pub fn from_array([azimuth, pitch, roll]: [f32; 3]) -> Self {
        Self::new(azimuth, pitch, roll)
    }
}

/// Build a matrix from row-major elements.
pub fn from_row_major(m: [f32; 9]) -> Mat3 {
    Mat3::from_cols_array(&m).transpose()
}

/// Row-major elements of `m`.
pub fn to_row_major(m: &Mat3) -> [f32; 9] {
    m.transpose().to_cols_array()
}

/// Standard 3x3 product `a * b`.
pub fn multiply(a: &Mat3, b: &Mat3) -> Mat3 {
    *a * *b
}

/// Rotation matrix for an orientation triple.
///
/// Composition order is roll first, then pitch, then azimuth:
/// `R = Z(azimuth) * (X(pitch) * Y(roll))`. The gyroscope seed depends on
/// this order matching [`orientation_from_matrix`].
pub fn matrix_from_orientation(o: EulerAngles) -> Mat3 {
    let (sin_x, cos_x) = o.pitch.sin_cos();
    let (sin_y, cos_y) = o.roll.sin_cos();
    let (sin_z, cos_z) = o.azimuth.sin_cos();

    #[rustfmt::skip]
    let x = from_row_major([
        1.0, 0.0, 0.0,
        0.0, cos_x, sin_x,
        0.0, -sin_x, cos_x,
    ]);
    #[rustfmt::skip]
    let y = from_row_major([
        cos_y, 0.0, sin_y,
        0.0, 1.0, 0.0,
        -sin_y, 0.0, cos_y,
    ]);
    #[rustfmt::skip]
    let z = from_row_major([
        cos_z, sin_z, 0.0,
        -sin_z, cos_z, 0.0,
        0.0, 0.0, 1.0,
    ]);

    multiply(&z, &multiply(&x, &y))
}

/// Rotation vector `(sin(theta/2) * axis, cos(theta/2))` covering one gyroscope step.
///
/// `half_dt` is half the integration step in seconds. Speeds below
/// [`GYRO_EPSILON`] leave the axis at zero.
pub fn delta_rotation_from_gyro(gyro: Vec3, half_dt: f32) -> Quat {
    let omega = gyro.length();
    let axis = if omega > GYRO_EPSILON {
        gyro / omega
    } else {
        Vec3::ZERO
    };

    let (sin_half, cos_half) = (omega * half_dt).sin_cos();
    let v = axis * sin_half;
    Quat::from_xyzw(v.x, v.y, v.z, cos_half)
}

/// Rotation matrix for a rotation vector `(x, y, z, w)`.
///
/// Written out element by element so a non-unit vector is converted the same
/// way the platform sensor API does it.
pub fn rotation_matrix_from_vector(q: Quat) -> Mat3 {
    let (q1, q2, q3, q0) = (q.x, q.y, q.z, q.w);

    let sq_q1 = 2.0 * q1 * q1;
    let sq_q2 = 2.0 * q2 * q2;
    let sq_q3 = 2.0 * q3 * q3;
    let q1_q2 = 2.0 * q1 * q2;
    let q3_q0 = 2.0 * q3 * q0;
    let q1_q3 = 2.0 * q1 * q3;
    let q2_q0 = 2.0 * q2 * q0;
    let q2_q3 = 2.0 * q2 * q3;
    let q1_q0 = 2.0 * q1 * q0;

    #[rustfmt::skip]
    let m = from_row_major([
        1.0 - sq_q2 - sq_q3, q1_q2 - q3_q0, q1_q3 + q2_q0,
        q1_q2 + q3_q0, 1.0 - sq_q1 - sq_q3, q2_q3 - q1_q0,
        q1_q3 - q2_q0, q2_q3 + q1_q0, 1.0 - sq_q1 - sq_q2,
    ]);
    m
}

/// Orientation triple of a rotation matrix.
pub fn orientation_from_matrix(m: &Mat3) -> EulerAngles {
    let r = to_row_major(m);
    EulerAngles {
        azimuth: r[1].atan2(r[4]),
        pitch: (-r[7]).clamp(-1.0, 1.0).asin(),
        roll: (-r[6]).atan2(r[8]),
    }
}

/// Device-to-world rotation from gravity and geomagnetic field vectors.
///
/// Returns `None` when the device is in free fall or the two vectors are
/// (close to) collinear, since no heading can be derived in either case.
pub fn rotation_from_gravity(gravity: Vec3, geomagnetic: Vec3) -> Option<Mat3> {
    if gravity.length_squared() < FREE_FALL_GRAVITY_SQUARED {
        return None;
    }

    let east = geomagnetic.cross(gravity);
    let east_norm = east.length();
    if !(east_norm >= MIN_EAST_NORM) {
        return None;
    }

    let east = east / east_norm;
    let up = gravity.normalize();
    let north = up.cross(east);

    #[rustfmt::skip]
    let m = from_row_major([
        east.x, east.y, east.z,
        north.x, north.y, north.z,
        up.x, up.y, up.z,
    ]);
    Some(m)
}
