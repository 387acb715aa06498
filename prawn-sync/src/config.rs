//! Config store: the backend-confirmed settings value

use sync_dispatch::{DispatchResult, GatewayError};

use crate::action::Action;
use crate::command::{CommandKind, Request};
use crate::effect::Effect;
use crate::model::Config;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigState {
    /// Last value the backend confirmed.
    pub value: Config,
    /// Set when the latest update was rejected; cleared by the next success.
    pub last_error: Option<GatewayError>,
}

impl ConfigState {
    pub fn new(value: Config) -> Self {
        Self {
            value,
            last_error: None,
        }
    }
}

pub fn reducer(state: &mut ConfigState, action: Action) -> DispatchResult<Effect> {
    match action {
        // Not applied locally: only the confirmed value is observable
        Action::ConfigSet(config) => DispatchResult::effect(Effect::Invoke(Request::UpdateConfig(config))),

        Action::ConfigDidUpdate(confirmed) => {
            let changed = state.value != confirmed || state.last_error.is_some();
            state.value = confirmed;
            state.last_error = None;
            DispatchResult::changed_if(changed)
        }

        Action::CommandDidFail {
            command: CommandKind::UpdateConfig,
            error,
        } => {
            state.last_error = Some(error);
            DispatchResult::changed()
        }

        _ => DispatchResult::unchanged(),
    }
}
