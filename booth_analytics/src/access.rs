//! Role-based visibility of assemblies and pages.
//!
//! These are pure filters: the allow-lists come already resolved in the
//! `UserProfile`, and the original order of the inputs is preserved.
//! A user who sees nothing gets empty lists, never an error. Use
//! `is_access_restricted` to tell this case apart.

use log::debug;

use crate::config::*;

pub fn visible_assemblies(user: &UserProfile, all: &[Assembly]) -> Vec<Assembly> {
    let visible: Vec<Assembly> = match user.role {
        Role::SuperAdmin | Role::Admin => all.to_vec(),
        Role::Client => {
            let allowed = user.accessible_assemblies.as_deref().unwrap_or(&[]);
            all.iter()
                .filter(|a| allowed.contains(&a.id))
                .cloned()
                .collect()
        }
    };
    debug!(
        "visible_assemblies: user {} ({:?}) sees {} of {} assemblies",
        user.uid,
        user.role,
        visible.len(),
        all.len()
    );
    visible
}

pub fn visible_pages(user: &UserProfile, all: &[Page]) -> Vec<Page> {
    all.iter()
        .filter(|p| page_allowed(user, p))
        .cloned()
        .collect()
}

fn page_allowed(user: &UserProfile, page: &Page) -> bool {
    let in_list = |list: &Option<Vec<String>>| match list {
        Some(ids) => ids.contains(&page.id),
        // Profiles created before the allow-lists existed see everything.
        None => true,
    };
    match (user.role, page.kind) {
        (Role::SuperAdmin, _) => true,
        (Role::Admin, PageKind::Dashboard) => true,
        (Role::Admin, PageKind::AdminSection) => in_list(&user.accessible_admin_sections),
        (Role::Client, PageKind::Dashboard) => in_list(&user.accessible_pages),
        (Role::Client, PageKind::AdminSection) => false,
    }
}

/// True when the user can see none of the assemblies.
pub fn is_access_restricted(user: &UserProfile, all: &[Assembly]) -> bool {
    visible_assemblies(user, all).is_empty()
}

pub fn can_edit_assembly(user: &UserProfile, assembly_id: &str) -> bool {
    match user.role {
        Role::SuperAdmin => true,
        Role::Admin => match user.accessible_assemblies.as_deref() {
            Some(ids) if !ids.is_empty() => ids.iter().any(|id| id == assembly_id),
            _ => true,
        },
        Role::Client => false,
    }
}

/// The assembly to show after the visible set changed.
///
/// Keeps the current selection when it is still visible, and otherwise picks
/// the first visible assembly.
pub fn reselect<'a>(current: Option<&str>, visible: &'a [Assembly]) -> Option<&'a Assembly> {
    current
        .and_then(|id| visible.iter().find(|a| a.id == id))
        .or_else(|| visible.first())
}
