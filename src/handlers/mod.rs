pub mod mqtt_handlers;
pub mod telemetry;
pub mod webhook;

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
            webhook::webhook_telemetry_handler,
            telemetry::telemetry_latest_handler,
            telemetry::telemetry_list_handler,
            telemetry::stream_url_handler
        )
    )
]
pub struct HydroIotApi;
