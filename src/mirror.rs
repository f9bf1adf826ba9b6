//! Mirrored representations of scene entities, such as a map view showing the AR scene from above.

use bevy_ecs::prelude::*;
use bevy_reflect::prelude::*;
use bevy_transform::prelude::*;

/// Copies the [`Transform`] of `source` onto this entity every frame, after the target has been
/// manipulated, billboarded, and scaled.
///
/// The copy is explicit: a mirror never shares state with its source, and a mirror of a mirror is
/// not followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Component, Reflect)]
#[require(Transform)]
pub struct Mirror {
    /// The entity to copy.
    pub source: Entity,
}

impl Mirror {
    /// Copy each source transform onto its mirrors.
    pub fn sync(
        sources: Query<&Transform, Without<Mirror>>,
        mut mirrors: Query<(&Mirror, &mut Transform)>,
    ) {
        for (mirror, mut transform) in mirrors.iter_mut() {
            if let Ok(source) = sources.get(mirror.source) {
                transform.set_if_neq(*source);
            }
        }
    }
}
