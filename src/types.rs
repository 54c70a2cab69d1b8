use crate::flow::FlowController;

pub struct AppState {
    pub flow: FlowController,
}
