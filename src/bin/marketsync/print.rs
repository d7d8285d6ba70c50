use marketsync::{
    application::{ProductPage, error::AppError},
    domain::ProductToggle,
    sync::SubscriptionState,
};
use marketsync_api_types::{PostscriptsSnapshot, ProductDetailSnapshot};
use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
struct PageView<'a> {
    product_id: Option<&'a str>,
    detail_state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail_error: Option<String>,
    detail: Option<&'a ProductDetailSnapshot>,
    postscripts_state: &'static str,
    postscripts: Option<&'a PostscriptsSnapshot>,
}

#[derive(Serialize)]
struct ToggleView<'a> {
    stage: &'static str,
    toggle: &'static str,
    product_id: Option<&'a str>,
    is_set: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<&'a Value>,
}

pub fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let out = serde_json::to_string_pretty(value)?;
    println!("{out}");
    Ok(())
}

pub fn page(page: &ProductPage) -> Result<(), AppError> {
    let detail = page.detail();
    let postscripts = page.postscripts();
    let detail_state = page.detail_state();

    print_json(&PageView {
        product_id: page.product_id(),
        detail_state: detail_state.label(),
        detail_error: error_text(&detail_state),
        detail: detail.as_deref(),
        postscripts_state: page.postscripts_state().label(),
        postscripts: postscripts.as_deref(),
    })
}

pub fn toggle(
    page: &ProductPage,
    toggle: ProductToggle,
    stage: &'static str,
    response: Option<&Value>,
) -> Result<(), AppError> {
    print_json(&ToggleView {
        stage,
        toggle: toggle.as_str(),
        product_id: page.product_id(),
        is_set: page.detail().map(|detail| toggle.is_set(&detail)),
        response,
    })
}

fn error_text(state: &SubscriptionState) -> Option<String> {
    state.error().map(|err| err.to_string())
}
