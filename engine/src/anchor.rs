//! Anchors: where a driver's center comes from.
//!
//! An anchor resolves a world transform from, in priority order, a direct
//! host node, a reference handle plus optional named child node, or a
//! fallback world position. An offset is always added; rotation and scale
//! are inherited only when their flags are set.

use std::sync::Arc;

use crate::host::{Host, NodeRef, RefHandle};
use crate::math::{Mat3, Transform, Vec3};

#[derive(Debug, Clone, Default)]
pub struct Anchor {
    direct: Option<NodeRef>,
    handle: RefHandle,
    node_name: String,
    world_position: Vec3,
    offset: Vec3,
    use_rotation: bool,
    use_scale: bool,
}

impl Anchor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Anchor to a host node directly. Clears any handle source.
    pub fn set_direct(&mut self, node: NodeRef) {
        self.direct = Some(node);
        self.handle = RefHandle::INVALID;
        self.node_name.clear();
    }

    /// Anchor to a reference's 3D root, or its named child node.
    pub fn set_by_handle(&mut self, handle: RefHandle, node_name: &str) {
        self.direct = None;
        self.handle = handle;
        self.node_name = node_name.to_string();
    }

    /// Drop node sources and use a fixed world position.
    pub fn set_world_position(&mut self, position: Vec3) {
        self.direct = None;
        self.handle = RefHandle::INVALID;
        self.node_name.clear();
        self.world_position = position;
    }

    /// Reset to fallback-only at the origin, with no offset or inheritance.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn set_offset(&mut self, offset: Vec3) {
        self.offset = offset;
    }

    pub fn offset(&self) -> Vec3 {
        self.offset
    }

    pub fn set_use_rotation(&mut self, use_rotation: bool) {
        self.use_rotation = use_rotation;
    }

    pub fn set_use_scale(&mut self, use_scale: bool) {
        self.use_scale = use_scale;
    }

    pub fn fallback_position(&self) -> Vec3 {
        self.world_position
    }

    pub fn has_anchor(&self) -> bool {
        self.direct.is_some() || self.handle.is_valid()
    }

    /// Whether the anchor currently points at `node`.
    pub fn is_direct(&self, node: &NodeRef) -> bool {
        self.direct.as_ref().is_some_and(|d| Arc::ptr_eq(d, node))
    }

    /// True with no node source; otherwise the node must resolve and still
    /// be attached to the scene graph.
    pub fn is_valid(&self, host: &dyn Host) -> bool {
        if !self.has_anchor() {
            return true;
        }
        self.resolve_node(host).is_some_and(|n| n.has_parent())
    }

    pub fn resolve_node(&self, host: &dyn Host) -> Option<NodeRef> {
        if let Some(direct) = &self.direct {
            return Some(Arc::clone(direct));
        }
        if self.handle.is_valid() {
            let name = (!self.node_name.is_empty()).then_some(self.node_name.as_str());
            return host.reference_node(self.handle, name);
        }
        None
    }

    pub fn world_position(&self, host: &dyn Host) -> Vec3 {
        match self.resolve_node(host) {
            Some(node) => node.world_transform().position + self.offset,
            None => self.world_position + self.offset,
        }
    }

    pub fn world_transform(&self, host: &dyn Host) -> Transform {
        match self.resolve_node(host) {
            Some(node) => {
                let world = node.world_transform();
                Transform {
                    position: world.position + self.offset,
                    rotation: if self.use_rotation {
                        world.rotation
                    } else {
                        Mat3::IDENTITY
                    },
                    scale: if self.use_scale { world.scale } else { 1.0 },
                }
            }
            None => Transform::at(self.world_position + self.offset),
        }
    }

    /// Map an anchor-local transform into world space.
    pub fn to_world(&self, host: &dyn Host, local: &Transform) -> Transform {
        let Some(node) = self.resolve_node(host) else {
            let mut world = *local;
            world.position = local.position + self.world_position + self.offset;
            return world;
        };
        let anchor = node.world_transform();
        let mut world = *local;
        world.position = anchor.position + anchor.rotation.rotate(local.position) + self.offset;
        if self.use_rotation {
            world.rotation = anchor.rotation.mul(&local.rotation);
        }
        if self.use_scale {
            world.scale *= anchor.scale;
        }
        world
    }
}
