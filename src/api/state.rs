use crate::desk::IncidentDesk;

#[derive(Clone)]
pub struct AppState {
    pub desk: IncidentDesk,
}

impl AppState {
    pub fn new(desk: IncidentDesk) -> Self {
        Self { desk }
    }
}
