use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{services::documentation::ApiDoc, state::SharedState};

const SWAGGER_PATH: &str = "/docs";
const OPENAPI_JSON_PATH: &str = "/api-doc/openapi.json";

/// Serve the Swagger UI and the generated OpenAPI document.
pub fn router(state: SharedState) -> Router<SharedState> {
    let swagger = SwaggerUi::new(SWAGGER_PATH).url(OPENAPI_JSON_PATH, ApiDoc::openapi());

    Router::<SharedState>::from(swagger).with_state(state)
}
