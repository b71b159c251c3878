use diet_api::ApiContext;

use crate::graphql::{build_schema, DietSchema};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) api: ApiContext,
    pub(crate) schema: DietSchema,
}

impl AppState {
    pub(crate) fn new(api: ApiContext) -> Self {
        let schema = build_schema(api.clone());
        Self { api, schema }
    }
}
