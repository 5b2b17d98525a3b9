//! Adapter around one host-owned projectile.
//!
//! The host may destroy a projectile at any moment without telling us, so
//! every access first checks that the stored handle still resolves to the
//! stored pointer. A handle that resolves elsewhere (or nowhere) means the
//! pointer is dangling and must not be touched.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::host::{CharUv, Host, ProjectilePtr, ProjectileWrite, RefHandle};
use crate::math::Transform;

/// Model used by projectiles that display a texture.
pub const ICON_TEMPLATE_MODEL: &str = "meshes\\3DUI\\icon_template.nif";
/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "meshes\\clutter\\dwemer\\centuriondynamocore01.nif";
/// Ticks to wait for geometry before giving up on a texture.
pub const MAX_TEXTURE_RETRIES: u32 = 50;
/// Scale written while hidden. Zero upsets the host renderer.
pub const HIDDEN_SCALE: f32 = 0.00001;
/// Flight range that keeps the host from expiring the projectile.
pub const RANGE_SENTINEL: f32 = 99999.0;

pub struct GameProjectile {
    host: Arc<dyn Host>,
    ptr: Option<ProjectilePtr>,
    handle: RefHandle,
    target: Transform,
    model_path: String,
    texture_path: String,
    border_color: String,
    needs_texture: bool,
    texture_retries: u32,
    char_uv: Option<CharUv>,
    needs_char_uv: bool,
    char_uv_retries: u32,
    visible: bool,
    marked_for_deletion: bool,
}

impl GameProjectile {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self {
            host,
            ptr: None,
            handle: RefHandle::INVALID,
            target: Transform::IDENTITY,
            model_path: DEFAULT_MODEL.to_string(),
            texture_path: String::new(),
            border_color: String::new(),
            needs_texture: false,
            texture_retries: 0,
            char_uv: None,
            needs_char_uv: false,
            char_uv_retries: 0,
            visible: true,
            marked_for_deletion: false,
        }
    }

    /// Attach to a freshly launched projectile.
    pub fn bind(&mut self, ptr: ProjectilePtr) {
        if self.ptr.is_some() {
            self.unbind();
        }
        let handle = self.host.handle_for(ptr);
        if !handle.is_valid() {
            warn!("game projectile: bind to {} without a reference handle", ptr);
            return;
        }
        self.ptr = Some(ptr);
        self.handle = handle;
        if !self.texture_path.is_empty() {
            self.needs_texture = true;
            self.texture_retries = 0;
        }
        self.needs_char_uv = self.char_uv.is_some();
        self.char_uv_retries = 0;
        self.prevent_form_expiry();
    }

    /// Detach. A projectile that still exists is hidden and given one last
    /// transform write; one marked for deletion is also disabled and deleted.
    pub fn unbind(&mut self) {
        if let Some(ptr) = self.ptr {
            if self.validate(false) {
                self.visible = false;
                self.host.hide_projectile(ptr);
                self.write_transform(ptr);
                if self.marked_for_deletion {
                    self.host.disable_projectile(ptr);
                    self.host.set_delete(ptr);
                }
            } else {
                debug!("game projectile: {} already destroyed by host", ptr);
            }
        }
        self.ptr = None;
        self.handle = RefHandle::INVALID;
        self.marked_for_deletion = false;
    }

    pub fn is_bound(&self) -> bool {
        self.ptr.is_some()
    }

    pub fn ptr(&self) -> Option<ProjectilePtr> {
        self.ptr
    }

    pub fn handle(&self) -> RefHandle {
        self.handle
    }

    /// Pointer and handle set, and the handle still resolves to the pointer.
    pub fn is_valid(&self) -> bool {
        match self.ptr {
            Some(ptr) if self.handle.is_valid() => self.host.lookup_by_handle(self.handle) == Some(ptr),
            _ => false,
        }
    }

    /// `is_valid`, optionally forgetting a dangling pointer.
    pub fn validate(&mut self, clear_if_invalid: bool) -> bool {
        let Some(ptr) = self.ptr else {
            return false;
        };
        if self.is_valid() {
            return true;
        }
        warn!(
            "game projectile: {} no longer valid (handle {:?}); host destroyed it",
            ptr, self.handle
        );
        if clear_if_invalid {
            self.ptr = None;
            self.handle = RefHandle::INVALID;
        }
        false
    }

    pub fn set_transform(&mut self, transform: Transform) {
        self.target = transform;
    }

    pub fn target_transform(&self) -> Transform {
        self.target
    }

    /// Per-tick overwrite from the physics hook. Returns whether a write
    /// reached the host.
    pub fn apply_transform(&mut self) -> bool {
        let Some(ptr) = self.ptr else {
            return false;
        };
        if !self.validate(true) {
            return false;
        }
        self.write_transform(ptr)
    }

    fn write_transform(&self, ptr: ProjectilePtr) -> bool {
        let write = ProjectileWrite {
            position: self.target.position,
            rotation: self.target.rotation,
            scale: if self.visible {
                self.target.scale
            } else {
                HIDDEN_SCALE
            },
        };
        self.host.write_projectile(ptr, &write)
    }

    /// Raise the base form's range and zero its gravity.
    fn prevent_form_expiry(&self) {
        if let Some(form) = self.ptr.and_then(|p| self.host.base_form_of(p)) {
            self.host.set_form_flight(form, RANGE_SENTINEL, 0.0);
        }
    }

    /// Main-thread only. Applies the texture once the model's geometry has
    /// materialised, retrying on later ticks up to `MAX_TEXTURE_RETRIES`.
    pub fn apply_pending_texture(&mut self) {
        if !self.needs_texture || self.texture_path.is_empty() {
            return;
        }
        let Some(ptr) = self.ptr else {
            return;
        };
        if !self.validate(true) {
            return;
        }

        self.texture_retries += 1;
        if self.texture_retries > MAX_TEXTURE_RETRIES {
            error!(
                "game projectile: exceeded {} retries for texture '{}', giving up",
                MAX_TEXTURE_RETRIES, self.texture_path
            );
            self.needs_texture = false;
            self.texture_retries = 0;
            return;
        }

        match self.host.geometry_node_count(ptr) {
            Some(n) if n > 0 => {}
            _ => return,
        }

        if self.host.set_texture(ptr, &self.texture_path) {
            self.needs_texture = false;
            self.texture_retries = 0;
        } else {
            error!("game projectile: failed to apply texture '{}', will retry", self.texture_path);
        }
    }

    /// Main-thread only. Selects the atlas cell once geometry exists, with
    /// the same retry bound as textures.
    pub fn apply_pending_char_uv(&mut self) {
        let (Some(uv), Some(ptr)) = (self.char_uv, self.ptr) else {
            return;
        };
        if !self.needs_char_uv || !self.validate(true) {
            return;
        }

        self.char_uv_retries += 1;
        if self.char_uv_retries > MAX_TEXTURE_RETRIES {
            error!(
                "game projectile: exceeded {} retries for atlas cell ({}, {}), giving up",
                MAX_TEXTURE_RETRIES, uv.col, uv.row
            );
            self.needs_char_uv = false;
            self.char_uv_retries = 0;
            return;
        }

        match self.host.geometry_node_count(ptr) {
            Some(n) if n > 0 => {}
            _ => return,
        }

        if self.host.set_char_uv(ptr, uv) {
            self.needs_char_uv = false;
            self.char_uv_retries = 0;
        } else {
            error!("game projectile: failed to select atlas cell ({}, {}), will retry", uv.col, uv.row);
        }
    }

    pub fn set_char_uv(&mut self, uv: Option<CharUv>) {
        self.char_uv = uv;
        self.needs_char_uv = uv.is_some() && self.ptr.is_some();
        self.char_uv_retries = 0;
    }

    pub fn char_uv(&self) -> Option<CharUv> {
        self.char_uv
    }

    pub fn needs_char_uv(&self) -> bool {
        self.needs_char_uv
    }

    pub fn needs_texture(&self) -> bool {
        self.needs_texture
    }

    pub fn texture_retries(&self) -> u32 {
        self.texture_retries
    }

    pub fn set_model_path(&mut self, path: &str) {
        self.model_path = path.to_string();
    }

    pub fn model_path(&self) -> &str {
        &self.model_path
    }

    pub fn set_texture_path(&mut self, path: &str) {
        self.texture_path = path.to_string();
        if !path.is_empty() {
            self.needs_texture = true;
            self.texture_retries = 0;
        }
    }

    pub fn texture_path(&self) -> &str {
        &self.texture_path
    }

    pub fn set_border_color(&mut self, color: &str) {
        self.border_color = color.to_string();
    }

    pub fn border_color(&self) -> &str {
        &self.border_color
    }

    /// Model the form pool must assign for this projectile.
    pub fn effective_model(&self) -> &str {
        if self.texture_path.is_empty() {
            &self.model_path
        } else {
            ICON_TEMPLATE_MODEL
        }
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn mark_for_deletion(&mut self) {
        self.marked_for_deletion = true;
        self.visible = false;
    }

    pub fn is_marked_for_deletion(&self) -> bool {
        self.marked_for_deletion
    }
}

impl Drop for GameProjectile {
    fn drop(&mut self) {
        if self.ptr.is_some() {
            self.unbind();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::headless::HeadlessHost;
    use crate::host::{FormId, LaunchRequest};
    use crate::math::Vec3;

    fn launch(host: &HeadlessHost) -> ProjectilePtr {
        let handle = host
            .launch_arrow(&LaunchRequest {
                weapon_form: FormId(0x700),
                ammo_form: FormId(0x900),
                projectile_form: FormId(0x800),
                position: Vec3::ZERO,
                angles: Vec3::ZERO,
            })
            .unwrap();
        host.lookup_by_handle(handle).unwrap()
    }

    #[test]
    fn test_bind_prevents_expiry() {
        let host = Arc::new(HeadlessHost::new());
        let ptr = launch(&host);
        let mut gp = GameProjectile::new(host.clone());
        gp.bind(ptr);
        assert!(gp.is_valid());
        assert_eq!(host.form_flight(FormId(0x800)), Some((RANGE_SENTINEL, 0.0)));
    }

    #[test]
    fn test_apply_transform_writes_host() {
        let host = Arc::new(HeadlessHost::new());
        let ptr = launch(&host);
        let mut gp = GameProjectile::new(host.clone());
        gp.bind(ptr);
        gp.set_transform(Transform {
            position: Vec3::new(1.0, 2.0, 3.0),
            scale: 0.5,
            ..Transform::IDENTITY
        });
        assert!(gp.apply_transform());
        let sim = host.projectile(ptr).unwrap();
        assert_eq!(sim.position, Vec3::new(1.0, 2.0, 3.0));
        assert!((sim.scale - 0.5).abs() < 1e-6);

        gp.set_visible(false);
        gp.apply_transform();
        assert!((host.projectile(ptr).unwrap().scale - HIDDEN_SCALE).abs() < 1e-9);
    }

    #[test]
    fn test_destroyed_projectile_is_cleared() {
        let host = Arc::new(HeadlessHost::new());
        let ptr = launch(&host);
        let mut gp = GameProjectile::new(host.clone());
        gp.bind(ptr);
        host.destroy_projectile(ptr);
        assert!(!gp.is_valid());
        assert!(!gp.apply_transform());
        assert!(!gp.is_bound());
    }

    #[test]
    fn test_unbind_marked_deletes() {
        let host = Arc::new(HeadlessHost::new());
        let ptr = launch(&host);
        let mut gp = GameProjectile::new(host.clone());
        gp.bind(ptr);
        gp.mark_for_deletion();
        gp.unbind();
        let sim = host.projectile(ptr).unwrap();
        assert!(sim.hidden && sim.disabled && sim.deleted);
        assert!(!gp.is_bound());
        assert!(!gp.is_marked_for_deletion());
    }

    #[test]
    fn test_texture_waits_for_geometry() {
        let host = Arc::new(HeadlessHost::new());
        host.set_geometry_delay(3);
        let ptr = launch(&host);
        let mut gp = GameProjectile::new(host.clone());
        gp.set_texture_path("textures\\icon.dds");
        gp.bind(ptr);

        gp.apply_pending_texture();
        assert!(gp.needs_texture());
        assert_eq!(gp.texture_retries(), 1);

        for _ in 0..3 {
            gp.apply_transform();
        }
        gp.apply_pending_texture();
        assert!(!gp.needs_texture());
        assert_eq!(host.projectile(ptr).unwrap().textures, vec!["textures\\icon.dds".to_string()]);
    }

    #[test]
    fn test_texture_gives_up_after_max_retries() {
        let host = Arc::new(HeadlessHost::new());
        host.set_geometry_delay(u32::MAX);
        let ptr = launch(&host);
        let mut gp = GameProjectile::new(host.clone());
        gp.set_texture_path("textures\\icon.dds");
        gp.bind(ptr);
        for _ in 0..=MAX_TEXTURE_RETRIES {
            gp.apply_pending_texture();
        }
        assert!(!gp.needs_texture());
        assert!(host.projectile(ptr).unwrap().textures.is_empty());
    }

    #[test]
    fn test_char_uv_applied_once_geometry_loads() {
        let host = Arc::new(HeadlessHost::new());
        host.set_geometry_delay(2);
        let ptr = launch(&host);
        let mut gp = GameProjectile::new(host.clone());
        let uv = CharUv { col: 3, row: 2, cols: 16, rows: 6 };
        gp.set_char_uv(Some(uv));
        assert!(!gp.needs_char_uv());
        gp.bind(ptr);
        assert!(gp.needs_char_uv());

        gp.apply_pending_char_uv();
        assert!(gp.needs_char_uv());
        assert!(host.projectile(ptr).unwrap().char_uv.is_none());

        for _ in 0..2 {
            gp.apply_transform();
        }
        gp.apply_pending_char_uv();
        assert!(!gp.needs_char_uv());
        assert_eq!(host.projectile(ptr).unwrap().char_uv, Some(uv));
    }

    #[test]
    fn test_effective_model() {
        let host = Arc::new(HeadlessHost::new());
        let mut gp = GameProjectile::new(host);
        assert_eq!(gp.effective_model(), DEFAULT_MODEL);
        gp.set_texture_path("t.dds");
        assert_eq!(gp.effective_model(), ICON_TEMPLATE_MODEL);
    }
}
