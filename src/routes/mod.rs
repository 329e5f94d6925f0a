/// Router Module Index
///
/// Routing is split by who may call it. Every module below `public` sits behind
/// `auth_middleware`; the role-gated modules additionally wrap each router in
/// `auth::require_access` with the resource it serves.

/// Anonymous-friendly routes: registration, login, read-only concern data and
/// the client route guard.
pub mod public;

/// Routes for any signed-in user, whatever the role.
pub mod authenticated;

/// Concern submission (Citizen only).
pub mod citizen;

/// Concern triage: status changes and assignment (staff roles).
pub mod staff;

/// Analytics, department and user administration, nested under `/admin`.
pub mod admin;

use axum::{Router, middleware};

use crate::{AppState, auth::require_access, policy::Resource};

/// Wraps every route of `router` in the server-side role check for `resource`.
pub(crate) fn gated(resource: Resource, router: Router<AppState>) -> Router<AppState> {
    router.route_layer(middleware::from_fn_with_state(resource, require_access))
}
