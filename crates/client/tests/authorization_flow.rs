use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use tokio::sync::oneshot;

use consorcia_auth::{
    Action, ApiModule, ApiModuleRole, Credential, GlobalRole, ModuleKey, MyModulesResponse,
    Principal, PrincipalId,
};
use consorcia_client::{
    evaluate, view_gate, AuthBackend, AuthorizationContext, BackendError, ClientConfig,
    DenialKind, KeyValueStore, LoadOutcome, MemoryStore, NotificationKind, RouteData,
    RouteRequest,
};

type ModulesReply = Result<MyModulesResponse, BackendError>;

enum Scripted {
    Ready(ModulesReply),
    Held(oneshot::Receiver<ModulesReply>),
}

/// Backend whose module listings are queued up front; a held reply resolves
/// only when the test sends it.
#[derive(Default)]
struct ScriptedBackend {
    modules: Mutex<VecDeque<Scripted>>,
    profile: Mutex<Option<Principal>>,
    module_calls: AtomicUsize,
}

impl ScriptedBackend {
    fn reply(&self, reply: ModulesReply) {
        self.modules.lock().unwrap().push_back(Scripted::Ready(reply));
    }

    fn hold(&self) -> oneshot::Sender<ModulesReply> {
        let (tx, rx) = oneshot::channel();
        self.modules.lock().unwrap().push_back(Scripted::Held(rx));
        tx
    }

    fn set_profile(&self, principal: Principal) {
        *self.profile.lock().unwrap() = Some(principal);
    }

    fn module_calls(&self) -> usize {
        self.module_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthBackend for ScriptedBackend {
    async fn fetch_profile(&self, _credential: &Credential) -> Result<Principal, BackendError> {
        let profile = self.profile.lock().unwrap().clone();
        profile.ok_or(BackendError::Api(404, "no profile scripted".into()))
    }

    async fn fetch_modules(&self, _credential: &Credential) -> ModulesReply {
        self.module_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.modules.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Ready(reply)) => reply,
            Some(Scripted::Held(rx)) => rx
                .await
                .unwrap_or_else(|_| Err(BackendError::Network("reply dropped".into()))),
            None => Err(BackendError::Network("no reply scripted".into())),
        }
    }
}

fn token() -> Credential {
    let exp = (Utc::now() + Duration::hours(1)).timestamp();
    let body = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{exp},"sub":"x"}}"#));
    Credential::new(format!("eyJhbGciOiJIUzI1NiJ9.{body}.sig"))
}

fn principal(id: &str, role: GlobalRole) -> Principal {
    Principal {
        id: PrincipalId::new(id).unwrap(),
        display_name: format!("user {id}"),
        email: None,
        role,
        approved: true,
        active: true,
    }
}

fn module(key: &str, orden: i32, edit: bool) -> ApiModule {
    ApiModule {
        clave: key.to_string(),
        nombre: Some(key.to_uppercase()),
        icono: None,
        orden,
        activo: true,
        requiere_consorcio: false,
        modulo_roles: vec![ApiModuleRole {
            puede_ver: true,
            puede_crear: false,
            puede_editar: edit,
            puede_eliminar: false,
        }],
    }
}

fn listing(modules: Vec<ApiModule>) -> ModulesReply {
    Ok(MyModulesResponse {
        success: true,
        rol: None,
        count: modules.len(),
        data: modules,
    })
}

fn context(storage: Arc<MemoryStore>, backend: Arc<ScriptedBackend>) -> Arc<AuthorizationContext> {
    consorcia_observability::init_for_tests();
    AuthorizationContext::new(ClientConfig::default(), storage, backend)
}

async fn until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

fn route(path: &str, data: RouteData) -> RouteRequest {
    RouteRequest::new(path, data)
}

#[tokio::test]
async fn logout_discards_in_flight_load() {
    let storage = Arc::new(MemoryStore::new());
    let backend = Arc::new(ScriptedBackend::default());
    let ctx = context(storage.clone(), backend.clone());

    ctx.login(token(), principal("7", GlobalRole::Owner));
    let release = backend.hold();

    let task = tokio::spawn({
        let ctx = ctx.clone();
        async move { ctx.load_permissions().await }
    });
    until(|| ctx.permissions().load_in_flight()).await;

    ctx.logout();
    release.send(listing(vec![module("tickets", 1, true)])).unwrap();

    assert_eq!(task.await.unwrap(), LoadOutcome::Discarded);
    assert!(ctx.permissions().is_empty());
    assert!(!ctx.can("tickets", Action::View));
    assert!(storage.get("consorcia.permissions").is_none());
}

#[tokio::test]
async fn account_switch_discards_previous_principals_load() {
    let backend = Arc::new(ScriptedBackend::default());
    let ctx = context(Arc::new(MemoryStore::new()), backend.clone());

    ctx.login(token(), principal("1", GlobalRole::Owner));
    let release = backend.hold();

    let task = tokio::spawn({
        let ctx = ctx.clone();
        async move { ctx.load_permissions().await }
    });
    until(|| ctx.permissions().load_in_flight()).await;

    ctx.login(token(), principal("2", GlobalRole::Provider));
    release.send(listing(vec![module("facturas", 1, true)])).unwrap();

    assert_eq!(task.await.unwrap(), LoadOutcome::Discarded);
    assert!(!ctx.can("facturas", Action::View));
    assert_ne!(ctx.permissions().stamp(), Some(PrincipalId::new("1").unwrap()));

    backend.reply(listing(vec![module("proveedores", 1, false)]));
    assert!(ctx.load_permissions().await.is_applied());
    assert_eq!(ctx.permissions().stamp(), Some(PrincipalId::new("2").unwrap()));
    assert!(ctx.can("proveedores", Action::View));
    assert!(!ctx.can("facturas", Action::View));
}

#[tokio::test]
async fn failed_reload_keeps_previous_permissions() {
    let backend = Arc::new(ScriptedBackend::default());
    let ctx = context(Arc::new(MemoryStore::new()), backend.clone());
    ctx.login(token(), principal("1", GlobalRole::Owner));

    backend.reply(listing(vec![module("tickets", 1, true)]));
    assert!(ctx.load_permissions().await.is_applied());

    backend.reply(Err(BackendError::Api(500, "boom".into())));
    let outcome = ctx.load_permissions().await;

    assert!(matches!(outcome, LoadOutcome::Failed(_)));
    assert!(ctx.can("tickets", Action::Edit));
    assert_eq!(ctx.notifier().unread_count(), 0);
}

#[tokio::test]
async fn first_load_failure_leaves_everything_denied() {
    let backend = Arc::new(ScriptedBackend::default());
    let ctx = context(Arc::new(MemoryStore::new()), backend.clone());
    ctx.login(token(), principal("1", GlobalRole::Owner));

    backend.reply(Err(BackendError::Network("offline".into())));
    assert!(matches!(ctx.load_permissions().await, LoadOutcome::Failed(_)));

    assert!(ctx.permissions().is_empty());
    assert!(!ctx.can("tickets", Action::View));
}

#[tokio::test]
async fn gates_redirect_unauthenticated_and_pending_principals() {
    let backend = Arc::new(ScriptedBackend::default());
    let ctx = context(Arc::new(MemoryStore::new()), backend.clone());

    let decision = evaluate(&ctx, &route("/tickets/3", RouteData::new()));
    assert_eq!(decision.reason(), Some(DenialKind::Unauthenticated));
    let redirect = decision.redirect().unwrap();
    assert_eq!(redirect.path, "/login");
    assert_eq!(redirect.query_value("returnUrl"), Some("/tickets/3"));

    let mut pending = principal("1", GlobalRole::Owner);
    pending.approved = false;
    ctx.login(token(), pending);

    let decision = evaluate(&ctx, &route("/tickets", RouteData::new()));
    assert_eq!(decision.reason(), Some(DenialKind::PendingApproval));
    assert_eq!(decision.redirect().unwrap().path, "/pending-approval");
    assert_eq!(backend.module_calls(), 0);

    let kinds: Vec<_> = ctx.notifier().list().iter().map(|n| n.kind).collect();
    assert_eq!(kinds, vec![NotificationKind::PendingApproval]);
}

#[tokio::test]
async fn role_gate_checks_the_allow_list() {
    let backend = Arc::new(ScriptedBackend::default());
    let ctx = context(Arc::new(MemoryStore::new()), backend.clone());
    ctx.login(token(), principal("1", GlobalRole::Owner));
    backend.reply(listing(vec![]));

    let admin_only = RouteData::new().roles([GlobalRole::GlobalAdmin, GlobalRole::TenantAdmin]);
    let decision = evaluate(&ctx, &route("/admin", admin_only));
    assert_eq!(decision.reason(), Some(DenialKind::InsufficientRole));
    assert_eq!(decision.redirect().unwrap().path, "/dashboard");

    let owners = RouteData::new().roles([GlobalRole::Owner]);
    assert!(evaluate(&ctx, &route("/mis-unidades", owners)).is_allowed());
}

#[tokio::test]
async fn auth_gate_loads_permissions_in_the_background() {
    let backend = Arc::new(ScriptedBackend::default());
    let ctx = context(Arc::new(MemoryStore::new()), backend.clone());
    ctx.login(token(), principal("1", GlobalRole::Owner));
    backend.reply(listing(vec![module("tickets", 1, false)]));

    let tickets = RouteData::new().module(ModuleKey::new("tickets").unwrap());

    // Nothing is cached yet, so the module check denies while the load runs.
    let first = evaluate(&ctx, &route("/tickets", tickets.clone()));
    assert_eq!(first.reason(), Some(DenialKind::InsufficientModulePermission));

    until(|| ctx.permissions().stamp().is_some()).await;
    assert_eq!(backend.module_calls(), 1);

    assert!(evaluate(&ctx, &route("/tickets", tickets.clone())).is_allowed());

    let edit = tickets.action(Action::Edit);
    let decision = evaluate(&ctx, &route("/tickets/3/edit", edit));
    assert_eq!(decision.reason(), Some(DenialKind::InsufficientModulePermission));
    assert_eq!(decision.redirect().unwrap().path, "/dashboard");

    // Already cached for this principal: no further fetches.
    assert!(evaluate(&ctx, &route("/inicio", RouteData::new())).is_allowed());
    tokio::task::yield_now().await;
    assert_eq!(backend.module_calls(), 1);
}

#[tokio::test]
async fn changed_grants_raise_a_notification() {
    let backend = Arc::new(ScriptedBackend::default());
    let ctx = context(Arc::new(MemoryStore::new()), backend.clone());
    ctx.login(token(), principal("1", GlobalRole::Owner));

    backend.reply(listing(vec![module("tickets", 1, false)]));
    ctx.load_permissions().await;
    assert_eq!(ctx.notifier().unread_count(), 0);

    backend.reply(listing(vec![module("tickets", 1, false)]));
    ctx.load_permissions().await;
    assert_eq!(ctx.notifier().unread_count(), 0);

    backend.reply(listing(vec![module("tickets", 1, true), module("expensas", 2, false)]));
    ctx.load_permissions().await;

    let notifications = ctx.notifier().list();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, NotificationKind::PermissionsChanged);
    assert!(notifications[0].message.contains("expensas"));
    assert!(notifications[0].message.contains("tickets"));
}

#[tokio::test]
async fn role_change_on_refresh_reloads_permissions() {
    let backend = Arc::new(ScriptedBackend::default());
    let ctx = context(Arc::new(MemoryStore::new()), backend.clone());
    ctx.login(token(), principal("1", GlobalRole::Owner));

    backend.reply(listing(vec![module("mis-unidades", 1, false)]));
    ctx.load_permissions().await;

    backend.set_profile(principal("1", GlobalRole::BuildingAdmin));
    backend.reply(listing(vec![module("edificios", 1, true)]));

    let refreshed = ctx.refresh_profile().await.unwrap();
    assert_eq!(refreshed.role, GlobalRole::BuildingAdmin);
    assert_eq!(
        ctx.session().current_principal().map(|p| p.role),
        Some(GlobalRole::BuildingAdmin)
    );

    assert!(ctx.can("edificios", Action::Edit));
    assert!(!ctx.can("mis-unidades", Action::View));

    let kinds: Vec<_> = ctx.notifier().list().iter().map(|n| n.kind).collect();
    assert!(kinds.contains(&NotificationKind::RoleChanged));
}

#[tokio::test]
async fn restart_hydrates_session_and_permissions_from_storage() {
    let storage = Arc::new(MemoryStore::new());
    let backend = Arc::new(ScriptedBackend::default());

    {
        let ctx = context(storage.clone(), backend.clone());
        ctx.login(token(), principal("1", GlobalRole::Owner));
        backend.reply(listing(vec![module("tickets", 1, true)]));
        assert!(ctx.load_permissions().await.is_applied());
        ctx.dispose();
    }

    let restarted = context(storage.clone(), backend.clone());
    assert!(restarted.session().is_authenticated());
    assert!(restarted.can("tickets", Action::Edit));

    let tickets = RouteData::new().module(ModuleKey::new("tickets").unwrap());
    assert!(evaluate(&restarted, &route("/tickets", tickets)).is_allowed());
    tokio::task::yield_now().await;
    assert_eq!(backend.module_calls(), 1);
}

#[tokio::test]
async fn watched_view_gate_follows_the_cache() {
    let backend = Arc::new(ScriptedBackend::default());
    let ctx = context(Arc::new(MemoryStore::new()), backend.clone());
    ctx.login(token(), principal("1", GlobalRole::Owner));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let id = view_gate::watch(&ctx, "tickets:editar", {
        let seen = seen.clone();
        move |allowed| seen.lock().unwrap().push(allowed)
    });

    backend.reply(listing(vec![module("tickets", 1, true)]));
    ctx.load_permissions().await;
    ctx.logout();

    assert_eq!(*seen.lock().unwrap().first().unwrap(), false);
    assert!(seen.lock().unwrap().contains(&true));
    assert_eq!(*seen.lock().unwrap().last().unwrap(), false);

    assert!(ctx.unsubscribe(id));
}

#[tokio::test]
async fn dashboard_without_credential_returns_to_it_after_login() {
    let ctx = context(Arc::new(MemoryStore::new()), Arc::new(ScriptedBackend::default()));

    let decision = evaluate(&ctx, &route("/dashboard", RouteData::new()));

    assert_eq!(decision.reason(), Some(DenialKind::Unauthenticated));
    let redirect = decision.redirect().unwrap();
    assert_eq!(redirect.path, "/login");
    assert_eq!(redirect.query_value("returnUrl"), Some("/dashboard"));
}

#[tokio::test]
async fn delete_route_denied_to_landing_without_delete_grant() {
    let backend = Arc::new(ScriptedBackend::default());
    let ctx = context(Arc::new(MemoryStore::new()), backend.clone());
    ctx.login(token(), principal("1", GlobalRole::TenantAdmin));

    backend.reply(listing(vec![module("personas", 1, false)]));
    ctx.load_permissions().await;

    let delete: Action = "eliminar".parse().unwrap();
    let data = RouteData::new()
        .module(ModuleKey::new("personas").unwrap())
        .action(delete);
    let decision = evaluate(&ctx, &route("/personas/4/eliminar", data));

    assert_eq!(decision.reason(), Some(DenialKind::InsufficientModulePermission));
    assert_eq!(decision.redirect().unwrap().path, "/dashboard");
    assert!(evaluate(&ctx, &route("/personas", RouteData::new().module(ModuleKey::new("personas").unwrap()))).is_allowed());
}

#[tokio::test]
async fn relogin_with_lower_role_drops_elevated_grants() {
    let backend = Arc::new(ScriptedBackend::default());
    let ctx = context(Arc::new(MemoryStore::new()), backend.clone());
    ctx.login(token(), principal("1", GlobalRole::TenantAdmin));

    let mut personas = module("personas", 1, true);
    personas.modulo_roles[0].puede_eliminar = true;
    backend.reply(listing(vec![personas]));
    ctx.load_permissions().await;
    assert!(ctx.can("personas", Action::Delete));

    ctx.login(token(), principal("1", GlobalRole::Owner));
    assert!(!ctx.can("personas", Action::Delete));

    backend.reply(listing(vec![module("personas", 1, false)]));
    let delete = RouteData::new()
        .module(ModuleKey::new("personas").unwrap())
        .action(Action::Delete);
    let decision = evaluate(&ctx, &route("/personas/4/eliminar", delete));
    assert_eq!(decision.reason(), Some(DenialKind::InsufficientModulePermission));

    until(|| ctx.permissions().stamp().is_some()).await;
    assert_eq!(backend.module_calls(), 2);
    assert!(ctx.can("personas", Action::View));
    assert!(!ctx.can("personas", Action::Delete));
}

#[tokio::test]
async fn hung_load_of_previous_account_does_not_block_the_next() {
    let backend = Arc::new(ScriptedBackend::default());
    let ctx = context(Arc::new(MemoryStore::new()), backend.clone());
    let tickets = RouteData::new().module(ModuleKey::new("tickets").unwrap());

    ctx.login(token(), principal("1", GlobalRole::Owner));
    // Never answered.
    let _stuck = backend.hold();
    evaluate(&ctx, &route("/tickets", tickets.clone()));
    until(|| ctx.permissions().load_in_flight()).await;

    ctx.logout();
    ctx.login(token(), principal("2", GlobalRole::Owner));
    backend.reply(listing(vec![module("tickets", 1, false)]));

    evaluate(&ctx, &route("/tickets", tickets.clone()));
    until(|| ctx.permissions().stamp().is_some()).await;

    assert_eq!(backend.module_calls(), 2);
    assert_eq!(ctx.permissions().stamp(), Some(PrincipalId::new("2").unwrap()));
    assert!(evaluate(&ctx, &route("/tickets", tickets)).is_allowed());
}

#[tokio::test]
async fn same_account_relogin_reschedules_after_a_hung_load() {
    let backend = Arc::new(ScriptedBackend::default());
    let ctx = context(Arc::new(MemoryStore::new()), backend.clone());

    ctx.login(token(), principal("1", GlobalRole::Owner));
    let _stuck = backend.hold();
    evaluate(&ctx, &route("/inicio", RouteData::new()));
    until(|| ctx.permissions().load_in_flight()).await;

    ctx.login(token(), principal("1", GlobalRole::Owner));
    backend.reply(listing(vec![module("tickets", 1, false)]));
    evaluate(&ctx, &route("/inicio", RouteData::new()));

    until(|| ctx.can("tickets", Action::View)).await;
    assert_eq!(backend.module_calls(), 2);
}

#[tokio::test]
async fn role_change_with_failed_reload_leaves_permissions_empty() {
    let backend = Arc::new(ScriptedBackend::default());
    let ctx = context(Arc::new(MemoryStore::new()), backend.clone());
    ctx.login(token(), principal("1", GlobalRole::BuildingAdmin));

    backend.reply(listing(vec![module("edificios", 1, true)]));
    ctx.load_permissions().await;

    backend.set_profile(principal("1", GlobalRole::Owner));
    backend.reply(Err(BackendError::Network("offline".into())));

    let refreshed = ctx.refresh_profile().await.unwrap();
    assert_eq!(refreshed.role, GlobalRole::Owner);
    assert!(ctx.permissions().is_empty());
    assert!(!ctx.can("edificios", Action::Edit));
}
