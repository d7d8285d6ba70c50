//! The product page: two live reads and two optimistic toggles driven by one route id.

use std::sync::Arc;

use marketsync_api_types::{PostscriptsSnapshot, ProductDetailSnapshot};
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::{
    domain::{ProductRoutes, ProductToggle},
    infra::http::NetworkError,
    sync::{
        ActionTrigger, MutationState, ReconcilePolicy, Subscription, SubscriptionState,
        SyncClient,
    },
};

pub struct ProductPage {
    client: SyncClient,
    routes: ProductRoutes,
    policy: ReconcilePolicy,
    product_id: Option<String>,
    detail: Subscription<ProductDetailSnapshot>,
    postscripts: Subscription<PostscriptsSnapshot>,
    favorite: ActionTrigger,
    reservation: ActionTrigger,
}

impl ProductPage {
    /// Subscribe to the detail and postscripts of `product_id` and bind both toggles.
    ///
    /// With no id every key is inactive: nothing is fetched and the toggles fail without a
    /// request.
    pub fn mount(
        client: SyncClient,
        routes: ProductRoutes,
        policy: ReconcilePolicy,
        product_id: Option<&str>,
    ) -> Self {
        info!(product_id = ?product_id, policy = %policy, "Mounting product page");

        let detail = client.subscribe(routes.detail_key(product_id));
        let postscripts = client.subscribe(routes.postscripts_key(product_id));
        let favorite = client.action(routes.toggle_key(ProductToggle::Favorite, product_id));
        let reservation = client.action(routes.toggle_key(ProductToggle::Reservation, product_id));

        Self {
            client,
            routes,
            policy,
            product_id: product_id.map(str::to_string),
            detail,
            postscripts,
            favorite,
            reservation,
        }
    }

    pub fn product_id(&self) -> Option<&str> {
        self.product_id.as_deref()
    }

    pub fn detail(&self) -> Option<Arc<ProductDetailSnapshot>> {
        self.detail.data()
    }

    pub fn detail_state(&self) -> SubscriptionState {
        self.detail.state()
    }

    pub fn postscripts(&self) -> Option<Arc<PostscriptsSnapshot>> {
        self.postscripts.data()
    }

    pub fn postscripts_state(&self) -> SubscriptionState {
        self.postscripts.state()
    }

    pub fn detail_subscription(&mut self) -> &mut Subscription<ProductDetailSnapshot> {
        &mut self.detail
    }

    /// Wait until neither read is pending.
    pub async fn settle(&mut self) -> (SubscriptionState, SubscriptionState) {
        let detail = self.detail.settle().await;
        let postscripts = self.postscripts.settle().await;
        (detail, postscripts)
    }

    pub fn on_favorite_click(&self) -> JoinHandle<Result<Value, NetworkError>> {
        self.toggle(ProductToggle::Favorite)
    }

    pub fn on_reservation_click(&self) -> JoinHandle<Result<Value, NetworkError>> {
        self.toggle(ProductToggle::Reservation)
    }

    /// Send the toggle request and flip the cached flag without waiting for the reply.
    ///
    /// The flag is only flipped when a detail snapshot is cached.
    pub fn toggle(&self, toggle: ProductToggle) -> JoinHandle<Result<Value, NetworkError>> {
        debug!(product_id = ?self.product_id, toggle = %toggle, "Toggle clicked");
        self.client.optimistic_action::<ProductDetailSnapshot, _, _>(
            self.trigger(toggle),
            json!({}),
            self.detail.key(),
            move |snapshot| toggle.apply(snapshot),
            move |snapshot| toggle.apply(snapshot),
            self.policy,
        )
    }

    pub fn favorite_state(&self) -> MutationState {
        self.favorite.state()
    }

    pub fn reservation_state(&self) -> MutationState {
        self.reservation.state()
    }

    /// Follow a route change: every key moves to the new id at once.
    pub fn set_product_id(&mut self, product_id: Option<&str>) {
        if self.product_id.as_deref() == product_id {
            return;
        }
        info!(from = ?self.product_id, to = ?product_id, "Product page route changed");

        let routes = &self.routes;
        self.detail.set_key(routes.detail_key(product_id));
        self.postscripts.set_key(routes.postscripts_key(product_id));
        self.favorite = self
            .client
            .action(routes.toggle_key(ProductToggle::Favorite, product_id));
        self.reservation = self
            .client
            .action(routes.toggle_key(ProductToggle::Reservation, product_id));
        self.product_id = product_id.map(str::to_string);
    }

    fn trigger(&self, toggle: ProductToggle) -> &ActionTrigger {
        match toggle {
            ProductToggle::Favorite => &self.favorite,
            ProductToggle::Reservation => &self.reservation,
        }
    }
}
