//! Physical quantities stored on particles.
//!
//! A quantity holds one, two or three parallel buffers depending on its
//! order: values only (e.g. mass), values plus first derivatives (e.g.
//! energy), or values plus first and second derivatives (positions).

use bincode::{Decode, Encode};
use lin_alg::f64::Vec3;

use crate::math::{Interval, SymmetricTensor, TracelessTensor};

/// Unique keys of particle quantities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Encode, Decode)]
pub enum QuantityId {
    /// Particle positions; second order, the derivatives are velocities
    /// and accelerations.
    Position,
    /// Smoothing length, the kernel support radius. Reinterpreted as the
    /// physical radius by the N-body solver.
    SmoothingLength,
    Mass,
    Density,
    /// Specific internal energy.
    Energy,
    Pressure,
    SoundSpeed,
    /// Deviatoric part of the stress tensor.
    DeviatoricStress,
    /// Scalar damage of the Grady-Kipp fragmentation model.
    Damage,
    /// Reduction factor of the yielding model.
    YieldReduction,
    /// Velocity divergence, used by smoothing-length evolution and the
    /// divergence timestep criterion.
    VelocityDivergence,
    /// Magnitude of the velocity rotation, used by the Balsara switch.
    VelocityRotation,
    /// Coefficient of the Morris & Monaghan time-dependent viscosity.
    AvAlpha,
    /// Number of neighbours of the particle.
    NeighbourCnt,
    /// Angular velocity of the aggregate the particle belongs to.
    AngularVelocity,
    /// Moment of inertia of spherical particles in the N-body run.
    MomentOfInertia,
}

impl QuantityId {
    pub fn name(self) -> &'static str {
        match self {
            Self::Position => "position",
            Self::SmoothingLength => "smoothing length",
            Self::Mass => "mass",
            Self::Density => "density",
            Self::Energy => "energy",
            Self::Pressure => "pressure",
            Self::SoundSpeed => "sound speed",
            Self::DeviatoricStress => "deviatoric stress",
            Self::Damage => "damage",
            Self::YieldReduction => "yield reduction",
            Self::VelocityDivergence => "velocity divergence",
            Self::VelocityRotation => "velocity rotation",
            Self::AvAlpha => "AV alpha",
            Self::NeighbourCnt => "neighbour count",
            Self::AngularVelocity => "angular velocity",
            Self::MomentOfInertia => "moment of inertia",
        }
    }
}

/// Number of derivative buffers a quantity carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Encode, Decode)]
pub enum OrderEnum {
    Zero,
    First,
    Second,
}

/// Value buffer plus derivative buffers of a quantity; buffers beyond the
/// quantity order stay empty.
#[derive(Clone, Debug, Default, PartialEq, Encode, Decode)]
pub struct Buffers<T> {
    pub values: Vec<T>,
    pub dt: Vec<T>,
    pub d2t: Vec<T>,
}

#[derive(Clone, Debug, Encode, Decode)]
pub enum QuantityData {
    Scalar(Buffers<f64>),
    Vector(Buffers<Vec3>),
    Tensor(Buffers<SymmetricTensor>),
    Traceless(Buffers<TracelessTensor>),
    Index(Buffers<u32>),
}

/// Element type storable as a quantity.
pub trait Element: Clone + Send + Sync + 'static {
    fn zero() -> Self;
    fn wrap(buffers: Buffers<Self>) -> QuantityData;
    fn buffers(data: &QuantityData) -> Option<&Buffers<Self>>;
    fn buffers_mut(data: &mut QuantityData) -> Option<&mut Buffers<Self>>;
    /// Clamp to the allowed range; identity for non-scalar elements.
    fn clamp_to(self, _range: &Interval) -> Self {
        self
    }
}

macro_rules! impl_element {
    ($type:ty, $variant:ident, $zero:expr) => {
        impl Element for $type {
            fn zero() -> Self {
                $zero
            }
            fn wrap(buffers: Buffers<Self>) -> QuantityData {
                QuantityData::$variant(buffers)
            }
            fn buffers(data: &QuantityData) -> Option<&Buffers<Self>> {
                match data {
                    QuantityData::$variant(b) => Some(b),
                    _ => None,
                }
            }
            fn buffers_mut(data: &mut QuantityData) -> Option<&mut Buffers<Self>> {
                match data {
                    QuantityData::$variant(b) => Some(b),
                    _ => None,
                }
            }
        }
    };
}

impl_element!(Vec3, Vector, Vec3::new_zero());
impl_element!(SymmetricTensor, Tensor, SymmetricTensor::null());
impl_element!(TracelessTensor, Traceless, TracelessTensor::null());
impl_element!(u32, Index, 0);

impl Element for f64 {
    fn zero() -> Self {
        0.
    }
    fn wrap(buffers: Buffers<Self>) -> QuantityData {
        QuantityData::Scalar(buffers)
    }
    fn buffers(data: &QuantityData) -> Option<&Buffers<Self>> {
        match data {
            QuantityData::Scalar(b) => Some(b),
            _ => None,
        }
    }
    fn buffers_mut(data: &mut QuantityData) -> Option<&mut Buffers<Self>> {
        match data {
            QuantityData::Scalar(b) => Some(b),
            _ => None,
        }
    }
    fn clamp_to(self, range: &Interval) -> Self {
        range.clamp(self)
    }
}

/// A single named quantity with its buffers, the allowed value range and
/// the minimal meaningful scale used by the derivative timestep criterion.
#[derive(Clone, Debug, Encode, Decode)]
pub struct Quantity {
    order: OrderEnum,
    data: QuantityData,
    range: Interval,
    min_value: f64,
}

impl Quantity {
    pub fn new<T: Element>(order: OrderEnum, values: Vec<T>) -> Self {
        let n = values.len();
        let buffers = Buffers {
            values,
            dt: if order >= OrderEnum::First {
                vec![T::zero(); n]
            } else {
                Vec::new()
            },
            d2t: if order >= OrderEnum::Second {
                vec![T::zero(); n]
            } else {
                Vec::new()
            },
        };
        Self {
            order,
            data: T::wrap(buffers),
            range: Interval::unbounded(),
            min_value: 0.,
        }
    }

    /// Reassembles a quantity from its serialized parts.
    pub fn from_parts(
        order: OrderEnum,
        data: QuantityData,
        range: Interval,
        min_value: f64,
    ) -> Self {
        Self {
            order,
            data,
            range,
            min_value,
        }
    }

    pub fn with_range(mut self, range: Interval, min_value: f64) -> Self {
        self.range = range;
        self.min_value = min_value;
        self
    }

    pub fn order(&self) -> OrderEnum {
        self.order
    }

    pub fn range(&self) -> Interval {
        self.range
    }

    pub fn min_value(&self) -> f64 {
        self.min_value
    }

    pub fn set_range(&mut self, range: Interval, min_value: f64) {
        self.range = range;
        self.min_value = min_value;
    }

    pub fn data(&self) -> &QuantityData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut QuantityData {
        &mut self.data
    }

    pub fn len(&self) -> usize {
        match &self.data {
            QuantityData::Scalar(b) => b.values.len(),
            QuantityData::Vector(b) => b.values.len(),
            QuantityData::Tensor(b) => b.values.len(),
            QuantityData::Traceless(b) => b.values.len(),
            QuantityData::Index(b) => b.values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sets the highest derivative buffer to zero, preparing the quantity
    /// for a new accumulation pass.
    pub fn zero_highest_derivative(&mut self) {
        fn clear<T: Element>(buffers: &mut Buffers<T>, order: OrderEnum) {
            match order {
                OrderEnum::Zero => {}
                OrderEnum::First => buffers.dt.fill(T::zero()),
                OrderEnum::Second => buffers.d2t.fill(T::zero()),
            }
        }
        let order = self.order;
        match &mut self.data {
            QuantityData::Scalar(b) => clear(b, order),
            QuantityData::Vector(b) => clear(b, order),
            QuantityData::Tensor(b) => clear(b, order),
            QuantityData::Traceless(b) => clear(b, order),
            QuantityData::Index(b) => clear(b, order),
        }
    }

    /// Removes the elements at the given sorted indices from all buffers.
    pub fn remove(&mut self, sorted_indices: &[usize]) {
        fn remove_from<T: Element>(buffer: &mut Vec<T>, sorted_indices: &[usize]) {
            if buffer.is_empty() {
                return;
            }
            let mut removed = sorted_indices.iter().peekable();
            let mut write = 0;
            for read in 0..buffer.len() {
                if removed.peek() == Some(&&read) {
                    removed.next();
                    continue;
                }
                buffer.swap(write, read);
                write += 1;
            }
            buffer.truncate(write);
        }
        fn remove_all<T: Element>(buffers: &mut Buffers<T>, sorted_indices: &[usize]) {
            remove_from(&mut buffers.values, sorted_indices);
            remove_from(&mut buffers.dt, sorted_indices);
            remove_from(&mut buffers.d2t, sorted_indices);
        }
        match &mut self.data {
            QuantityData::Scalar(b) => remove_all(b, sorted_indices),
            QuantityData::Vector(b) => remove_all(b, sorted_indices),
            QuantityData::Tensor(b) => remove_all(b, sorted_indices),
            QuantityData::Traceless(b) => remove_all(b, sorted_indices),
            QuantityData::Index(b) => remove_all(b, sorted_indices),
        }
    }

    /// Appends all buffers of `other`; orders and types must match,
    /// checked by the storage before calling.
    pub fn append(&mut self, other: &Quantity) {
        fn append_buffers<T: Element>(a: &mut Buffers<T>, b: &Buffers<T>) {
            a.values.extend_from_slice(&b.values);
            a.dt.extend_from_slice(&b.dt);
            a.d2t.extend_from_slice(&b.d2t);
        }
        match (&mut self.data, &other.data) {
            (QuantityData::Scalar(a), QuantityData::Scalar(b)) => append_buffers(a, b),
            (QuantityData::Vector(a), QuantityData::Vector(b)) => append_buffers(a, b),
            (QuantityData::Tensor(a), QuantityData::Tensor(b)) => append_buffers(a, b),
            (QuantityData::Traceless(a), QuantityData::Traceless(b)) => append_buffers(a, b),
            (QuantityData::Index(a), QuantityData::Index(b)) => append_buffers(a, b),
            _ => unreachable!("appending quantities of different types"),
        }
    }

    pub fn same_layout(&self, other: &Quantity) -> bool {
        self.order == other.order
            && std::mem::discriminant(&self.data) == std::mem::discriminant(&other.data)
    }
}

/// Dispatches a generic block over the arithmetic buffer types of a
/// quantity; index buffers are skipped.
macro_rules! dispatch_arithmetic {
    ($data:expr, |$buffers:ident| $body:expr) => {
        match $data {
            crate::quantity::QuantityData::Scalar($buffers) => $body,
            crate::quantity::QuantityData::Vector($buffers) => $body,
            crate::quantity::QuantityData::Tensor($buffers) => $body,
            crate::quantity::QuantityData::Traceless($buffers) => $body,
            crate::quantity::QuantityData::Index(_) => {}
        }
    };
}

pub(crate) use dispatch_arithmetic;
