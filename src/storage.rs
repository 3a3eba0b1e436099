//! Container of particle quantities, material partitions and attractors.

use std::any::Any;
use std::collections::BTreeMap;

use lin_alg::f64::Vec3;

use crate::error::{Error, Result};
use crate::math::Interval;
use crate::quantity::{Buffers, Element, OrderEnum, Quantity, QuantityData, QuantityId};
use crate::settings::BodySettings;

/// Point mass participating in gravity but not in SPH.
#[derive(Clone, Copy, Debug)]
pub struct Attractor {
    pub position: Vec3,
    pub velocity: Vec3,
    pub mass: f64,
    pub radius: f64,
}

/// Contiguous index range of particles sharing the same material
/// parameters.
#[derive(Clone, Debug)]
pub struct MaterialPartition {
    pub settings: BodySettings,
    /// First particle of the partition.
    pub start: usize,
    /// One past the last particle of the partition.
    pub end: usize,
}

/// Base object for storing scalar, vector and tensor quantities of SPH
/// particles. All quantity buffers have the same length at all times.
#[derive(Default)]
pub struct Storage {
    quantities: BTreeMap<QuantityId, Quantity>,
    materials: Vec<MaterialPartition>,
    attractors: Vec<Attractor>,
    /// Opaque auxiliary state attached by solvers (e.g. the aggregate
    /// holder); its lifetime is tied to the storage.
    user_data: Option<Box<dyn Any + Send>>,
}

impl Storage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initializes a storage holding a single material partition. The
    /// partition range is updated by the first inserted quantity.
    pub fn with_material(settings: BodySettings) -> Self {
        let mut storage = Self::default();
        storage.materials.push(MaterialPartition {
            settings,
            start: 0,
            end: 0,
        });
        storage
    }

    pub fn particle_cnt(&self) -> usize {
        self.quantities
            .values()
            .next()
            .map_or(0, |q| q.len())
    }

    pub fn quantity_cnt(&self) -> usize {
        self.quantities.len()
    }

    pub fn has(&self, id: QuantityId) -> bool {
        self.quantities.contains_key(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = QuantityId> + '_ {
        self.quantities.keys().copied()
    }

    pub fn quantity(&self, id: QuantityId) -> Result<&Quantity> {
        self.quantities.get(&id).ok_or(Error::MissingQuantity(id))
    }

    pub fn quantity_mut(&mut self, id: QuantityId) -> Result<&mut Quantity> {
        self.quantities
            .get_mut(&id)
            .ok_or(Error::MissingQuantity(id))
    }

    /// Registers a new quantity; derivative buffers are allocated to zero
    /// for first and second order. The first inserted quantity determines
    /// the particle count, later ones must match it.
    pub fn insert<T: Element>(
        &mut self,
        id: QuantityId,
        order: OrderEnum,
        values: Vec<T>,
    ) -> Result<()> {
        if !self.quantities.is_empty() && values.len() != self.particle_cnt() {
            return Err(Error::InvalidSetup(format!(
                "quantity {:?} has {} values, storage holds {} particles",
                id,
                values.len(),
                self.particle_cnt()
            )));
        }
        let first = self.quantities.is_empty();
        self.quantities.insert(id, Quantity::new(order, values));
        if first {
            let n = self.particle_cnt();
            for mat in &mut self.materials {
                mat.start = 0;
                mat.end = n;
            }
        }
        Ok(())
    }

    /// Inserts a quantity reconstructed from a state file, bypassing the
    /// length check against existing quantities.
    pub fn insert_serialized(&mut self, id: QuantityId, quantity: Quantity) {
        self.quantities.insert(id, quantity);
    }

    /// Drops a quantity from the storage, if present.
    pub fn remove_quantity(&mut self, id: QuantityId) {
        self.quantities.remove(&id);
    }

    /// Replaces the material partitions; used when loading a state file.
    pub fn set_materials(&mut self, materials: Vec<MaterialPartition>) {
        self.materials = materials;
    }

    /// Registers a quantity holding the same value for every particle.
    pub fn insert_uniform<T: Element>(
        &mut self,
        id: QuantityId,
        order: OrderEnum,
        value: T,
    ) -> Result<()> {
        let n = self.particle_cnt();
        self.insert(id, order, vec![value; n])
    }

    pub fn value<T: Element>(&self, id: QuantityId) -> Result<&[T]> {
        let q = self.quantity(id)?;
        T::buffers(q.data())
            .map(|b| b.values.as_slice())
            .ok_or(Error::MissingQuantity(id))
    }

    pub fn value_mut<T: Element>(&mut self, id: QuantityId) -> Result<&mut [T]> {
        let q = self.quantity_mut(id)?;
        T::buffers_mut(q.data_mut())
            .map(|b| b.values.as_mut_slice())
            .ok_or(Error::MissingQuantity(id))
    }

    pub fn derivative<T: Element>(&self, id: QuantityId) -> Result<&[T]> {
        let q = self.quantity(id)?;
        T::buffers(q.data())
            .map(|b| b.dt.as_slice())
            .ok_or(Error::MissingQuantity(id))
    }

    pub fn derivative_mut<T: Element>(&mut self, id: QuantityId) -> Result<&mut [T]> {
        let q = self.quantity_mut(id)?;
        T::buffers_mut(q.data_mut())
            .map(|b| b.dt.as_mut_slice())
            .ok_or(Error::MissingQuantity(id))
    }

    pub fn second_derivative<T: Element>(&self, id: QuantityId) -> Result<&[T]> {
        let q = self.quantity(id)?;
        T::buffers(q.data())
            .map(|b| b.d2t.as_slice())
            .ok_or(Error::MissingQuantity(id))
    }

    pub fn second_derivative_mut<T: Element>(&mut self, id: QuantityId) -> Result<&mut [T]> {
        let q = self.quantity_mut(id)?;
        T::buffers_mut(q.data_mut())
            .map(|b| b.d2t.as_mut_slice())
            .ok_or(Error::MissingQuantity(id))
    }

    /// All three buffers of a quantity at once, mutably.
    pub fn all_buffers_mut<T: Element>(&mut self, id: QuantityId) -> Result<&mut Buffers<T>> {
        let q = self.quantity_mut(id)?;
        T::buffers_mut(q.data_mut()).ok_or(Error::MissingQuantity(id))
    }

    /// Sets the allowed range and minimal scale of a quantity.
    pub fn set_range(&mut self, id: QuantityId, range: Interval, min_value: f64) -> Result<()> {
        self.quantity_mut(id)?.set_range(range, min_value);
        Ok(())
    }

    /// Clears the highest-order derivative buffers of all quantities,
    /// preparing them for accumulation.
    pub fn zero_highest_derivatives(&mut self) {
        for q in self.quantities.values_mut() {
            q.zero_highest_derivative();
        }
    }

    pub fn add_attractor(&mut self, position: Vec3, velocity: Vec3, mass: f64, radius: f64) {
        self.attractors.push(Attractor {
            position,
            velocity,
            mass,
            radius,
        });
    }

    pub fn attractors(&self) -> &[Attractor] {
        &self.attractors
    }

    pub fn attractors_mut(&mut self) -> &mut [Attractor] {
        &mut self.attractors
    }

    pub fn material_cnt(&self) -> usize {
        self.materials.len()
    }

    pub fn material(&self, mat_id: usize) -> &MaterialPartition {
        &self.materials[mat_id]
    }

    pub fn material_mut(&mut self, mat_id: usize) -> &mut MaterialPartition {
        &mut self.materials[mat_id]
    }

    pub fn materials(&self) -> &[MaterialPartition] {
        &self.materials
    }

    /// Index of the material partition the particle belongs to.
    pub fn material_of(&self, particle: usize) -> usize {
        debug_assert!(particle < self.particle_cnt());
        self.materials
            .iter()
            .position(|m| particle >= m.start && particle < m.end)
            .unwrap_or(0)
    }

    /// Concatenates the particles of `other`, unifying the quantity sets.
    /// Both storages must hold the same quantity ids and orders.
    pub fn merge(&mut self, other: Storage) -> Result<()> {
        if self.quantities.is_empty() {
            *self = other;
            return Ok(());
        }
        if self.quantities.len() != other.quantities.len() {
            return Err(Error::IncompatibleStorage(format!(
                "{} vs {} quantities",
                self.quantities.len(),
                other.quantities.len()
            )));
        }
        for (id, q) in &self.quantities {
            match other.quantities.get(id) {
                Some(other_q) if q.same_layout(other_q) => {}
                _ => {
                    return Err(Error::IncompatibleStorage(format!(
                        "quantity {:?} differs between storages",
                        id
                    )));
                }
            }
        }

        let offset = self.particle_cnt();
        for (id, q) in &mut self.quantities {
            q.append(&other.quantities[id]);
        }
        for mat in other.materials {
            self.materials.push(MaterialPartition {
                settings: mat.settings,
                start: mat.start + offset,
                end: mat.end + offset,
            });
        }
        self.attractors.extend(other.attractors);
        Ok(())
    }

    /// Deletes the given particles, preserving the ordering of survivors
    /// and updating partition boundaries. Previously taken views are
    /// invalidated by this call.
    pub fn remove(&mut self, indices: &[usize]) {
        if indices.is_empty() {
            return;
        }
        let mut sorted: Vec<usize> = indices.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        for q in self.quantities.values_mut() {
            q.remove(&sorted);
        }
        for mat in &mut self.materials {
            let removed_before = sorted.partition_point(|&i| i < mat.start);
            let removed_inside = sorted.partition_point(|&i| i < mat.end) - removed_before;
            mat.start -= removed_before;
            mat.end -= removed_before + removed_inside;
        }
        self.materials.retain(|m| m.end > m.start);
    }

    /// Deep copy of quantities, materials and attractors. User data is not
    /// cloneable and is left empty in the copy.
    pub fn duplicate(&self) -> Storage {
        Storage {
            quantities: self.quantities.clone(),
            materials: self.materials.clone(),
            attractors: self.attractors.clone(),
            user_data: None,
        }
    }

    /// Clones the highest-order derivative buffers of all quantities.
    pub fn clone_highest_derivatives(&self) -> BTreeMap<QuantityId, QuantityData> {
        fn highest<T: Element>(buffers: &Buffers<T>, order: OrderEnum) -> Buffers<T> {
            Buffers {
                values: Vec::new(),
                dt: if order == OrderEnum::First {
                    buffers.dt.clone()
                } else {
                    Vec::new()
                },
                d2t: if order == OrderEnum::Second {
                    buffers.d2t.clone()
                } else {
                    Vec::new()
                },
            }
        }
        self.quantities
            .iter()
            .map(|(id, q)| {
                let data = match q.data() {
                    QuantityData::Scalar(b) => QuantityData::Scalar(highest(b, q.order())),
                    QuantityData::Vector(b) => QuantityData::Vector(highest(b, q.order())),
                    QuantityData::Tensor(b) => QuantityData::Tensor(highest(b, q.order())),
                    QuantityData::Traceless(b) => QuantityData::Traceless(highest(b, q.order())),
                    QuantityData::Index(b) => QuantityData::Index(highest(b, q.order())),
                };
                (*id, data)
            })
            .collect()
    }

    /// Swaps the highest-order derivative buffers with previously cloned
    /// ones (see [`Self::clone_highest_derivatives`]).
    pub fn swap_highest_derivatives(&mut self, other: &mut BTreeMap<QuantityId, QuantityData>) {
        fn swap<T: Element>(buffers: &mut Buffers<T>, other: &mut Buffers<T>, order: OrderEnum) {
            match order {
                OrderEnum::Zero => {}
                OrderEnum::First => std::mem::swap(&mut buffers.dt, &mut other.dt),
                OrderEnum::Second => std::mem::swap(&mut buffers.d2t, &mut other.d2t),
            }
        }
        for (id, q) in &mut self.quantities {
            let Some(other_data) = other.get_mut(id) else {
                continue;
            };
            let order = q.order();
            match (q.data_mut(), other_data) {
                (QuantityData::Scalar(a), QuantityData::Scalar(b)) => swap(a, b, order),
                (QuantityData::Vector(a), QuantityData::Vector(b)) => swap(a, b, order),
                (QuantityData::Tensor(a), QuantityData::Tensor(b)) => swap(a, b, order),
                (QuantityData::Traceless(a), QuantityData::Traceless(b)) => swap(a, b, order),
                (QuantityData::Index(a), QuantityData::Index(b)) => swap(a, b, order),
                _ => {}
            }
        }
    }

    /// Copies all buffers from another storage with the same layout; used
    /// by multi-stage integrators to restore a snapshot.
    pub fn copy_buffers_from(&mut self, other: &Storage) {
        for (id, q) in &mut self.quantities {
            if let Some(other_q) = other.quantities.get(id) {
                if q.same_layout(other_q) {
                    *q = other_q.clone();
                }
            }
        }
    }

    pub fn set_user_data<T: Any + Send>(&mut self, data: T) {
        self.user_data = Some(Box::new(data));
    }

    pub fn user_data<T: Any + Send>(&self) -> Option<&T> {
        self.user_data.as_ref().and_then(|d| d.downcast_ref())
    }

    pub fn user_data_mut<T: Any + Send>(&mut self) -> Option<&mut T> {
        self.user_data.as_mut().and_then(|d| d.downcast_mut())
    }

    pub fn take_user_data<T: Any + Send>(&mut self) -> Option<Box<T>> {
        match self.user_data.take() {
            Some(data) => match data.downcast() {
                Ok(data) => Some(data),
                Err(data) => {
                    self.user_data = Some(data);
                    None
                }
            },
            None => None,
        }
    }

    pub fn has_user_data(&self) -> bool {
        self.user_data.is_some()
    }

    /// Checks that all quantities hold the same number of particles.
    pub fn is_valid(&self) -> bool {
        let n = self.particle_cnt();
        self.quantities.values().all(|q| q.len() == n)
    }
}

/// Convenience bundle of the position buffers, used all over the collision
/// and gravity code.
pub struct PositionBuffers<'a> {
    pub r: &'a mut [Vec3],
    pub v: &'a mut [Vec3],
    pub dv: &'a mut [Vec3],
}

impl Storage {
    pub fn positions_mut(&mut self) -> Result<PositionBuffers<'_>> {
        let buffers = self.all_buffers_mut::<Vec3>(QuantityId::Position)?;
        Ok(PositionBuffers {
            r: &mut buffers.values,
            v: &mut buffers.dt,
            dv: &mut buffers.d2t,
        })
    }
}

