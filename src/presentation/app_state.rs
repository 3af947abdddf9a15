// Application state for HTTP handlers
use crate::application::location_channel::LocationChannel;
use crate::application::operator_service::OperatorService;

#[derive(Clone)]
pub struct AppState {
    pub channel: LocationChannel,
    pub operator_service: OperatorService,
}
