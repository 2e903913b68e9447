use axum::Router;
use hazard_report_shared::API_KEY_HEADER;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

pub const SWAGGER_UI_PATH: &str = "/api/swagger-ui";
pub const OPENAPI_JSON_PATH: &str = "/api/openapi.json";

struct ApiKeyAddon;

impl Modify for ApiKeyAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(API_KEY_HEADER))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(description = "Hazard inspection report API", license(name = "MIT or Apache2", identifier="MIT Apache2.0"), title = "Hazard Report", version = env!("CARGO_PKG_VERSION")),
    paths(
        crate::reports::list_reports,
        crate::reports::get_report,
        crate::reports::create_report,
        crate::reports::update_report,
        crate::reports::delete_report,
        crate::attachment::upload_attachment,
        crate::attachment::delete_upload,
        crate::export::export_pdf
    ),
    components(schemas(
        hazard_report_shared::report::Report,
        hazard_report_shared::report::ReportFields,
        hazard_report_shared::report::ReportPatch,
        hazard_report_shared::report::RiskLevel,
        hazard_report_shared::attachment::Attachment,
        hazard_report_shared::api::ErrorResponse,
        hazard_report_shared::api::OkResponse,
        hazard_report_shared::api::CreatedResponse,
        hazard_report_shared::api::ReportResponse,
        hazard_report_shared::api::UploadResponse,
        hazard_report_shared::api::ExportRequest
    )),
    modifiers(&ApiKeyAddon)
)]
pub struct ApiDoc;

pub(crate) fn api_route<T: Clone + Sync + Send + 'static>() -> Router<T> {
    let doc = ApiDoc::openapi();
    Router::new().merge(SwaggerUi::new(SWAGGER_UI_PATH).url(OPENAPI_JSON_PATH, doc))
}
