//! Removal of projectiles left over from an earlier session.
//!
//! A save taken while menus were open persists our projectiles. After a
//! load they are strays: nothing drives them, yet they hold our forms.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::host::{FormId, Host};

/// Disable and delete every cell projectile whose base form is one of
/// `forms`. Returns how many were removed.
pub fn cleanup_orphans(host: &dyn Host, forms: &[FormId]) -> usize {
    if forms.is_empty() {
        warn!("cleanup: no projectile forms resolved, skipping");
        return 0;
    }
    let ours: HashSet<FormId> = forms.iter().copied().collect();
    info!("cleanup: scanning player cell for orphaned projectiles");

    let orphans: Vec<_> = host
        .cell_projectiles()
        .into_iter()
        .filter(|ptr| host.base_form_of(*ptr).is_some_and(|f| ours.contains(&f)))
        .collect();

    for ptr in &orphans {
        info!("cleanup: deleting orphaned projectile {}", ptr);
        host.disable_projectile(*ptr);
        host.set_delete(*ptr);
    }
    info!("cleanup: removed {} orphaned projectiles", orphans.len());
    orphans.len()
}
