//! Authentication state shared through the Dioxus context.

use std::sync::Arc;

use dioxus::prelude::*;
use vendora_shared::{AdminUser, ApiError, ErrorKind};

use crate::api_client::ApiClient;
use crate::config::ClientConfig;
use crate::services::AuthApi;
use crate::session::{MemoryNavigator, Navigator, SessionStore};
use crate::ws::AuctionChannel;

/// Authentication context provided to the app
#[derive(Clone)]
pub struct AuthContext {
    config: ClientConfig,
    session: SessionStore,
    client: ApiClient,
    navigator: Arc<MemoryNavigator>,
    pub user: Signal<Option<AdminUser>>,
}

impl PartialEq for AuthContext {
    fn eq(&self, other: &Self) -> bool {
        self.user == other.user && Arc::ptr_eq(&self.navigator, &other.navigator)
    }
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext")
            .field("api_url", &self.config.api_url)
            .field("user", &self.user.peek().as_ref().map(|u| u.id.clone()))
            .finish_non_exhaustive()
    }
}

/// Provider component that sets up auth context
#[component]
pub fn AuthProvider(children: Element) -> Element {
    let config = use_hook(ClientConfig::from_env);
    let session = use_hook(|| SessionStore::from_config(&config));
    let user = use_signal(|| session.user());

    use_context_provider(|| AuthContext::new(config.clone(), session.clone(), user));

    children
}

/// Keep the router and the session in step.
///
/// Call once from a component inside the `Router`, such as the root layout.
/// The client learns the current route, and session terminations redirect the
/// router and clear the published user.
pub fn use_session_routing<R: Routable>() {
    let auth = use_context::<AuthContext>();
    let route = use_route::<R>();
    auth.navigator.set_location(route.to_string());

    let router = use_navigator();
    use_future(move || {
        let auth = auth.clone();
        async move {
            let mut redirects = auth.navigator.watch_redirects();
            while redirects.changed().await.is_ok() {
                let Some(path) = redirects.borrow_and_update().clone() else {
                    continue;
                };
                if !auth.session.is_authenticated() {
                    let mut user = auth.user;
                    user.set(None);
                }
                match path.parse::<R>() {
                    Ok(target) => {
                        let _ = router.replace(target);
                    }
                    Err(_) => crate::log_error!("No route matches redirect to {}", path),
                }
            }
        }
    });
}

impl AuthContext {
    pub fn new(config: ClientConfig, session: SessionStore, user: Signal<Option<AdminUser>>) -> Self {
        let navigator = Arc::new(MemoryNavigator::default());
        let client = ApiClient::new(&config, session.clone()).with_navigator(navigator.clone());
        Self {
            config,
            session,
            client,
            navigator,
            user,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> SessionStore {
        self.session.clone()
    }

    /// API client bound to this session
    pub fn client(&self) -> ApiClient {
        self.client.clone()
    }

    pub fn auth(&self) -> AuthApi {
        AuthApi::new(self.client())
    }

    /// Sign in and publish the user.
    pub async fn login(&self, email: &str, password: &str) -> Result<AdminUser, ApiError> {
        let mut user = self.user;
        let admin = self.auth().login(email, password).await?;
        user.set(Some(admin.clone()));
        Ok(admin)
    }

    /// Logout and clear session
    pub async fn logout(&self) {
        let mut user = self.user;
        self.auth().logout().await;
        user.set(None);
        self.navigator.redirect(&self.config.login_path);
    }

    /// Check if user is authenticated
    pub fn is_authenticated(&self) -> bool {
        self.user.read().is_some() && self.session.is_authenticated()
    }

    /// Ask the server who we are. Clears the user when the session is gone.
    pub async fn check_session(&self) -> Result<(), ApiError> {
        let mut user = self.user;
        if !self.session.is_authenticated() {
            user.set(None);
            return Ok(());
        }
        match self.auth().me().await.and_then(|resp| resp.into_data()) {
            Ok(admin) => {
                user.set(Some(admin));
                Ok(())
            }
            Err(e) => {
                if e.kind == ErrorKind::SessionExpired {
                    user.set(None);
                }
                Err(e)
            }
        }
    }

    /// The process-wide auction channel, authenticated with this session.
    pub fn auction_channel(&self) -> AuctionChannel {
        AuctionChannel::shared(&self.config, &self.session)
    }

    /// Where the client last sent the user. The router follows this.
    pub fn location(&self) -> String {
        self.navigator.current_path()
    }

    pub fn navigator(&self) -> Arc<MemoryNavigator> {
        self.navigator.clone()
    }
}
