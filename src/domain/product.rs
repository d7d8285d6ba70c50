//! Product page endpoints and the flag toggles applied to cached detail snapshots.

use std::fmt;

use marketsync_api_types::ProductDetailSnapshot;

use crate::cache::{CacheKey, KeyError, Params, PathTemplate};

pub const DEFAULT_DETAIL_ROUTE: &str = "/api/products/{id}";
pub const DEFAULT_POSTSCRIPTS_ROUTE: &str = "/api/products/{id}/postscript";
pub const DEFAULT_FAVORITE_ROUTE: &str = "/api/products/{id}/fav";
pub const DEFAULT_RESERVATION_ROUTE: &str = "/api/products/{id}/reserved";

const ID_PARAM: &str = "id";

/// The four endpoints behind one product page, all keyed by the route's `{id}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductRoutes {
    pub detail: PathTemplate,
    pub postscripts: PathTemplate,
    pub favorite: PathTemplate,
    pub reservation: PathTemplate,
}

impl ProductRoutes {
    pub fn parse(
        detail: &str,
        postscripts: &str,
        favorite: &str,
        reservation: &str,
    ) -> Result<Self, KeyError> {
        let routes = Self {
            detail: parse_route(detail)?,
            postscripts: parse_route(postscripts)?,
            favorite: parse_route(favorite)?,
            reservation: parse_route(reservation)?,
        };
        routes.ensure_distinct()?;
        Ok(routes)
    }

    pub fn defaults() -> Result<Self, KeyError> {
        Self::parse(
            DEFAULT_DETAIL_ROUTE,
            DEFAULT_POSTSCRIPTS_ROUTE,
            DEFAULT_FAVORITE_ROUTE,
            DEFAULT_RESERVATION_ROUTE,
        )
    }

    pub fn detail_key(&self, id: Option<&str>) -> CacheKey {
        self.detail.derive(&id_params(id))
    }

    pub fn postscripts_key(&self, id: Option<&str>) -> CacheKey {
        self.postscripts.derive(&id_params(id))
    }

    pub fn toggle_key(&self, toggle: ProductToggle, id: Option<&str>) -> CacheKey {
        let template = match toggle {
            ProductToggle::Favorite => &self.favorite,
            ProductToggle::Reservation => &self.reservation,
        };
        template.derive(&id_params(id))
    }
}

impl ProductRoutes {
    /// Each route must derive its own key; a shared key would hold two value types.
    fn ensure_distinct(&self) -> Result<(), KeyError> {
        let named = [
            ("detail", &self.detail),
            ("postscripts", &self.postscripts),
            ("favorite", &self.favorite),
            ("reservation", &self.reservation),
        ];
        for (index, (name, template)) in named.iter().enumerate() {
            let clash = named[..index]
                .iter()
                .find(|(_, earlier)| earlier == template);
            if let Some((other, _)) = clash {
                return Err(KeyError::InvalidTemplate {
                    template: template.as_str().to_string(),
                    reason: format!("shared by the `{other}` and `{name}` routes"),
                });
            }
        }
        Ok(())
    }
}

fn parse_route(raw: &str) -> Result<PathTemplate, KeyError> {
    let template = PathTemplate::parse(raw)?;
    if !template.placeholders().any(|name| name == ID_PARAM) {
        return Err(KeyError::InvalidTemplate {
            template: raw.to_string(),
            reason: format!("must contain the `{{{ID_PARAM}}}` placeholder"),
        });
    }
    Ok(template)
}

fn id_params(id: Option<&str>) -> Params {
    Params::new().with_opt(ID_PARAM, id)
}

/// A viewer-owned boolean on the detail snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductToggle {
    Favorite,
    Reservation,
}

impl ProductToggle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Favorite => "favorite",
            Self::Reservation => "reservation",
        }
    }

    /// Flip this toggle's flag, leaving every other field as it was.
    ///
    /// Flipping twice yields the original snapshot, so the same function serves as rollback.
    pub fn apply(&self, snapshot: &ProductDetailSnapshot) -> ProductDetailSnapshot {
        match self {
            Self::Favorite => toggle_liked(snapshot),
            Self::Reservation => toggle_reserved(snapshot),
        }
    }

    pub fn is_set(&self, snapshot: &ProductDetailSnapshot) -> bool {
        match self {
            Self::Favorite => snapshot.is_liked,
            Self::Reservation => snapshot.is_reserved,
        }
    }
}

impl fmt::Display for ProductToggle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn toggle_liked(snapshot: &ProductDetailSnapshot) -> ProductDetailSnapshot {
    ProductDetailSnapshot {
        is_liked: !snapshot.is_liked,
        ..snapshot.clone()
    }
}

pub fn toggle_reserved(snapshot: &ProductDetailSnapshot) -> ProductDetailSnapshot {
    ProductDetailSnapshot {
        is_reserved: !snapshot.is_reserved,
        ..snapshot.clone()
    }
}
