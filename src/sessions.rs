use std::collections::HashMap;

/// What a live connection is bound to. Disconnect notifications carry
/// only the connection id, so this is the reverse index that recovers
/// the (player, race) pair.
#[derive(Clone, Debug)]
pub struct SessionBinding {
    pub player_id: String,
    pub race_id: u64,
    pub address: String,
}

#[derive(Default)]
pub struct SessionTable {
    bindings: HashMap<String, SessionBinding>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a connection on successful join. Re-binding an existing
    /// connection (re-join after rollover) replaces the old binding.
    pub fn bind(&mut self, connection_id: &str, binding: SessionBinding) {
        self.bindings.insert(connection_id.to_string(), binding);
    }

    pub fn resolve(&self, connection_id: &str) -> Option<&SessionBinding> {
        self.bindings.get(connection_id)
    }

    pub fn unbind(&mut self, connection_id: &str) -> Option<SessionBinding> {
        self.bindings.remove(connection_id)
    }
}
