//! Rigid transforms in the simulator's frame convention.
//!
//! Locations are metres, rotations are degrees (`pitch`, `yaw`, `roll`)
//! applied in the simulator's yaw-pitch-roll order. The only composite
//! operation the bridge needs is [`Transform::relative_to`]: the pose of a
//! child expressed in its parent's frame.

/// A 3D vector in metres.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vector3 {
    /// X component.
    pub x: f64,
    /// Y component.
    pub y: f64,
    /// Z component.
    pub z: f64,
}

impl Vector3 {
    /// Construct a vector from its components.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

/// Euler rotation in degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rotation {
    /// Rotation about the lateral axis.
    pub pitch: f64,
    /// Rotation about the vertical axis.
    pub yaw: f64,
    /// Rotation about the longitudinal axis.
    pub roll: f64,
}

impl Rotation {
    /// Construct a rotation from degrees.
    pub const fn new(pitch: f64, yaw: f64, roll: f64) -> Self {
        Self { pitch, yaw, roll }
    }

    fn matrix(self) -> Mat3 {
        let (sp, cp) = self.pitch.to_radians().sin_cos();
        let (sy, cy) = self.yaw.to_radians().sin_cos();
        let (sr, cr) = self.roll.to_radians().sin_cos();
        [
            [cp * cy, cy * sp * sr - sy * cr, -cy * sp * cr - sy * sr],
            [cp * sy, sy * sp * sr + cy * cr, -sy * sp * cr + cy * sr],
            [sp, -cp * sr, cp * cr],
        ]
    }

    fn from_matrix(m: &Mat3) -> Self {
        let pitch = m[2][0].clamp(-1.0, 1.0).asin();
        let yaw = m[1][0].atan2(m[0][0]);
        let roll = (-m[2][1]).atan2(m[2][2]);
        Self::new(pitch.to_degrees(), yaw.to_degrees(), roll.to_degrees())
    }
}

type Mat3 = [[f64; 3]; 3];

fn transpose(m: &Mat3) -> Mat3 {
    let mut t = [[0.0; 3]; 3];
    for (i, row) in m.iter().enumerate() {
        for (j, v) in row.iter().enumerate() {
            t[j][i] = *v;
        }
    }
    t
}

fn mul(a: &Mat3, b: &Mat3) -> Mat3 {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

fn apply(m: &Mat3, v: Vector3) -> Vector3 {
    Vector3::new(
        m[0][0] * v.x + m[0][1] * v.y + m[0][2] * v.z,
        m[1][0] * v.x + m[1][1] * v.y + m[1][2] * v.z,
        m[2][0] * v.x + m[2][1] * v.y + m[2][2] * v.z,
    )
}

/// Location plus rotation.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Transform {
    /// Translation component.
    pub location: Vector3,
    /// Rotation component.
    pub rotation: Rotation,
}

impl Transform {
    /// Construct a transform.
    pub const fn new(location: Vector3, rotation: Rotation) -> Self {
        Self { location, rotation }
    }

    /// Express `self` (a world-frame pose) in the frame of `parent`.
    ///
    /// Computes `parent⁻¹ · self`.
    pub fn relative_to(&self, parent: &Transform) -> Transform {
        let parent_inv = transpose(&parent.rotation.matrix());
        let location = apply(&parent_inv, self.location.sub(parent.location));
        let rotation = Rotation::from_matrix(&mul(&parent_inv, &self.rotation.matrix()));
        Transform { location, rotation }
    }
}
