use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::codec::{self, Command};
use super::dispatcher::SceneDispatcher;
use super::params::Params;
use super::response::{Reply, Response};
use super::{routes_assets, routes_ik, routes_nodes, routes_paths, routes_scene};
use crate::error::{BridgeError, BridgeResult};

pub type HandlerFuture = Pin<Box<dyn Future<Output = BridgeResult<Reply>> + Send>>;
pub type ActionHandler = Arc<dyn Fn(ActionCtx) -> HandlerFuture + Send + Sync>;

/// Everything a leaf handler gets: its params and a way onto the scene
/// owner.
pub struct ActionCtx {
    pub dispatcher: SceneDispatcher,
    pub params: Params,
}

/// One domain's action table.
pub struct Domain {
    name: &'static str,
    aliases: &'static [&'static str],
    actions: Vec<(&'static str, ActionHandler)>,
}

impl Domain {
    pub fn new(name: &'static str, aliases: &'static [&'static str]) -> Self {
        Self {
            name,
            aliases,
            actions: Vec::new(),
        }
    }

    pub fn action<F, Fut>(mut self, name: &'static str, handler: F) -> Self
    where
        F: Fn(ActionCtx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BridgeResult<Reply>> + Send + 'static,
    {
        let handler: ActionHandler =
            Arc::new(move |ctx: ActionCtx| Box::pin(handler(ctx)) as HandlerFuture);
        self.actions.push((name, handler));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn action_names(&self) -> Vec<&'static str> {
        self.actions.iter().map(|(name, _)| *name).collect()
    }

    fn answers_to(&self, domain: &str) -> bool {
        self.name.eq_ignore_ascii_case(domain)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(domain))
    }

    fn handler(&self, action: &str) -> Option<&ActionHandler> {
        self.actions
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(action))
            .map(|(_, handler)| handler)
    }
}

/// Two-level `domain -> action -> handler` table.
pub struct Router {
    dispatcher: SceneDispatcher,
    domains: Vec<Domain>,
}

impl Router {
    pub fn new(dispatcher: SceneDispatcher) -> Self {
        Self {
            dispatcher,
            domains: Vec::new(),
        }
    }

    pub fn domain(mut self, domain: Domain) -> Self {
        self.domains.push(domain);
        self
    }

    /// Every built-in domain.
    pub fn standard(dispatcher: SceneDispatcher) -> Self {
        Self::new(dispatcher)
            .domain(routes_nodes::domain())
            .domain(routes_assets::domain())
            .domain(routes_scene::domain())
            .domain(routes_paths::domain())
            .domain(routes_ik::domain())
    }

    pub fn domains(&self) -> impl Iterator<Item = &Domain> {
        self.domains.iter()
    }

    pub fn resolve(&self, domain: &str, action: &str) -> BridgeResult<&ActionHandler> {
        let table = self
            .domains
            .iter()
            .find(|d| d.answers_to(domain.trim()))
            .ok_or_else(|| BridgeError::unknown("domain", domain))?;
        table
            .handler(action.trim())
            .ok_or_else(|| BridgeError::unknown_action(action.trim(), table.name))
    }

    pub async fn dispatch(&self, command: Command) -> BridgeResult<Reply> {
        let handler = self.resolve(&command.domain, &command.action)?;
        let ctx = ActionCtx {
            dispatcher: self.dispatcher.clone(),
            params: command.params,
        };
        handler(ctx).await
    }

    /// Decodes, routes and runs one request line.
    pub async fn handle_line(&self, line: &str) -> Response {
        let command = match codec::decode(line) {
            Ok(command) => command,
            Err(err) => {
                tracing::debug!(error = %err, "request rejected");
                return Response::from_error(&err);
            }
        };
        let (domain, action) = (command.domain.clone(), command.action.clone());
        match self.dispatch(command).await {
            Ok(reply) => {
                tracing::debug!(%domain, %action, "request handled");
                reply.into()
            }
            Err(err) => {
                tracing::debug!(%domain, %action, error = %err, "request failed");
                Response::from_error(&err)
            }
        }
    }
}
