use crate::config::PreferredBackend;
use crate::error::RenderError;

/// The concrete backend chosen for one render.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChosenBackend {
    Local,
    Wasm,
}

/// Breaks the `auto` tie when both backends are available. A real host
/// supplies this based on where the coordinator is running; tests and
/// demos can hardcode it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HostKind {
    BrowserLike,
    Native,
}

/// Outcome of one selection: which backend, and whether it was reached
/// by falling back from the caller's stated preference. Exposed so the
/// coordinator can publish `active_renderer`/`renderer_status` — the
/// selector's decision is observable, not just its result.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Decision {
    pub backend: ChosenBackend,
    pub used_fallback: bool,
}

/// Pure decision function over preference + availability + host-kind hint.
/// Holds no I/O state of its own; `local_available`/`wasm_available` are
/// supplied by the caller from the detector's installation records and the
/// WASM backend's own asset validation.
pub struct Selector {
    preferred: PreferredBackend,
    fallback_enabled: bool,
}

impl Selector {
    pub fn new(preferred: PreferredBackend, fallback_enabled: bool) -> Self {
        Self {
            preferred,
            fallback_enabled,
        }
    }

    /// Chooses a backend for one request without invoking it.
    pub fn choose(
        &self,
        local_available: bool,
        wasm_available: bool,
        host_kind: HostKind,
    ) -> Result<Decision, RenderError> {
        match self.preferred {
            PreferredBackend::Local => {
                if local_available {
                    return Ok(Decision {
                        backend: ChosenBackend::Local,
                        used_fallback: false,
                    });
                }
                if self.fallback_enabled && wasm_available {
                    return Ok(Decision {
                        backend: ChosenBackend::Wasm,
                        used_fallback: true,
                    });
                }
                Err(RenderError::ToolMissing)
            }
            PreferredBackend::Wasm => {
                if wasm_available {
                    return Ok(Decision {
                        backend: ChosenBackend::Wasm,
                        used_fallback: false,
                    });
                }
                if self.fallback_enabled && local_available {
                    return Ok(Decision {
                        backend: ChosenBackend::Local,
                        used_fallback: true,
                    });
                }
                Err(RenderError::ToolMissing)
            }
            PreferredBackend::Auto => match (local_available, wasm_available) {
                (true, true) => {
                    let backend = match host_kind {
                        HostKind::BrowserLike => ChosenBackend::Wasm,
                        HostKind::Native => ChosenBackend::Local,
                    };
                    Ok(Decision {
                        backend,
                        used_fallback: false,
                    })
                }
                (true, false) => Ok(Decision {
                    backend: ChosenBackend::Local,
                    used_fallback: false,
                }),
                (false, true) => Ok(Decision {
                    backend: ChosenBackend::Wasm,
                    used_fallback: false,
                }),
                (false, false) => Err(RenderError::ToolMissing),
            },
        }
    }
}
