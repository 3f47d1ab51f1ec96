use application::CoreServices;

#[derive(Clone)]
pub struct AppState {
    pub core: CoreServices,
}

impl AppState {
    pub fn new(core: CoreServices) -> Self {
        Self { core }
    }
}
