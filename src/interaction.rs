//! Picking, grabbing and pinning cloth vertices with the cursor ray.
//!
//! A pick measures every vertex of every cloth instance against the ray and
//! keeps the closest one; ties go to the vertex seen first. While the grab
//! is held, the solver pulls the vertex [`GRAB_PULL_FRACTION`] of the way
//! towards the ray each frame and zeroes its velocity. Pinning sticks until
//! the scene is reset, independently of the grab.

use crate::camera::Ray;
use crate::error::SolverError;
use crate::solver::{ClothBackend, GrabRequest};

/// Fraction of the distance to the cursor ray covered per frame.
pub const GRAB_PULL_FRACTION: f32 = 0.8;

/// The vertex closest to a pick ray.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PickHit {
    pub instance: usize,
    pub vertex: u32,
    pub distance: f32,
}

/// Reduce per-instance vertex distances to the global minimum.
pub fn closest_vertex<D: AsRef<[f32]>>(distances: &[D]) -> Option<PickHit> {
    let mut best: Option<PickHit> = None;
    for (instance, per_vertex) in distances.iter().enumerate() {
        for (vertex, &distance) in per_vertex.as_ref().iter().enumerate() {
            if best.map_or(true, |b| distance < b.distance) {
                best = Some(PickHit { instance, vertex: vertex as u32, distance });
            }
        }
    }
    best
}

/// Find the cloth vertex closest to `ray` across all instances.
pub fn pick<B: ClothBackend + ?Sized>(backend: &mut B, ray: &Ray) -> Result<Option<PickHit>, SolverError> {
    let distances = (0..backend.num_instances())
        .map(|i| backend.ray_distances(i, ray))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(closest_vertex(&distances))
}

/// Grab and pin state driven by mouse gestures.
#[derive(Debug, Default)]
pub struct Interaction {
    grabbed: Option<PickHit>,
    ray: Option<Ray>,
}

impl Interaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick under the cursor and start dragging; `pin` also pins the vertex.
    pub fn begin<B: ClothBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        ray: Ray,
        pin: bool,
    ) -> Result<Option<PickHit>, SolverError> {
        let hit = pick(backend, &ray)?;
        match hit {
            Some(hit) => {
                if pin {
                    backend.pin(hit.instance, hit.vertex);
                    log::info!("Pinned vertex {} of cloth {}", hit.vertex, hit.instance);
                }
                log::debug!("Grabbed vertex {} of cloth {} (distance {:.4})", hit.vertex, hit.instance, hit.distance);
                self.grabbed = Some(hit);
                self.ray = Some(ray);
            }
            None => self.release(),
        }
        Ok(hit)
    }

    /// Follow the cursor while the grab is held.
    pub fn drag(&mut self, ray: Ray) {
        if self.grabbed.is_some() {
            self.ray = Some(ray);
        }
    }

    /// Stop dragging. Pins stay.
    pub fn release(&mut self) {
        self.grabbed = None;
        self.ray = None;
    }

    pub fn grabbed(&self) -> Option<PickHit> {
        self.grabbed
    }

    /// What the solver should apply this frame.
    pub fn grab_request(&self) -> Option<GrabRequest> {
        let hit = self.grabbed?;
        Some(GrabRequest { instance: hit.instance, vertex: hit.vertex, ray: self.ray? })
    }
}
