use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::sync::Arc;
use tui_input::{Input, InputRequest};

use kyanos_core::registry::clamp_selection;
use kyanos_core::{
    Adapter, AdapterProperty, Config, CoreEvent, Device, DeviceFilter, DeviceRegistry, Error,
    Focus, Operation, PairingCoordinator, PairingExchange, Resolution,
};

use crate::worker::Worker;

pub struct App {
    pub registry: DeviceRegistry,
    pub adapter: Option<Adapter>,
    pub focus: Focus,
    pub selected_available: usize,
    pub selected_connected: usize,
    pub scanning: bool,
    /// A connect, disconnect or forget is in flight.
    pub busy: bool,
    pub status: String,
    pub status_is_error: bool,
    pub pending: Option<PairingExchange>,
    /// Highest exchange id already reported resolved.
    last_resolved: u64,
    pub alias_input: Option<Input>,
    pub config: Config,
    pub should_quit: bool,
    filter: DeviceFilter,
    worker: Worker,
    coordinator: Arc<PairingCoordinator>,
}

impl App {
    pub fn new(config: Config, worker: Worker, coordinator: Arc<PairingCoordinator>) -> Self {
        Self {
            registry: DeviceRegistry::new(),
            adapter: None,
            focus: Focus::Available,
            selected_available: 0,
            selected_connected: 0,
            scanning: false,
            busy: false,
            status: "Loading devices...".to_string(),
            status_is_error: false,
            pending: None,
            last_resolved: 0,
            alias_input: None,
            filter: config.device_filter(),
            config,
            should_quit: false,
            worker,
            coordinator,
        }
    }

    pub fn available(&self) -> Vec<&Device> {
        self.registry.available(&self.filter)
    }

    pub fn connected(&self) -> Vec<&Device> {
        self.registry.connected()
    }

    pub fn selected_index(&self, focus: Focus) -> usize {
        match focus {
            Focus::Available => self.selected_available,
            Focus::Connected => self.selected_connected,
        }
    }

    pub fn selected_device(&self) -> Option<&Device> {
        self.registry
            .select(self.focus, self.selected_index(self.focus), &self.filter)
    }

    pub fn previous_device(&mut self) {
        let len = self.registry.view(self.focus, &self.filter).len();
        if len > 0 {
            let selected = self.selected_mut();
            *selected = if *selected == 0 { len - 1 } else { *selected - 1 };
        }
    }

    pub fn next_device(&mut self) {
        let len = self.registry.view(self.focus, &self.filter).len();
        if len > 0 {
            let selected = self.selected_mut();
            *selected = (*selected + 1) % len;
        }
    }

    pub fn next_panel(&mut self) {
        self.focus = self.focus.toggle();
    }

    fn selected_mut(&mut self) -> &mut usize {
        match self.focus {
            Focus::Available => &mut self.selected_available,
            Focus::Connected => &mut self.selected_connected,
        }
    }

    fn clamp_selections(&mut self) {
        self.selected_available = clamp_selection(self.selected_available, self.available().len());
        self.selected_connected = clamp_selection(self.selected_connected, self.connected().len());
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status = message.into();
        self.status_is_error = false;
    }

    fn set_error(&mut self, message: impl Into<String>) {
        self.status = message.into();
        self.status_is_error = true;
    }

    fn name_for(&self, address: &str) -> String {
        self.registry
            .get(address)
            .map(|dev| dev.display_name().to_string())
            .unwrap_or_else(|| address.to_string())
    }

    /// Exchanges carry the daemon's object path rather than an address.
    pub fn name_for_path(&self, path: &str) -> String {
        self.registry
            .order()
            .iter()
            .filter_map(|address| self.registry.get(address))
            .find(|dev| dev.path == path)
            .map(|dev| dev.display_name().to_string())
            .unwrap_or_else(|| path.rsplit('/').next().unwrap_or(path).to_string())
    }

    pub fn handle_event(&mut self, event: CoreEvent) {
        match event {
            CoreEvent::DevicesUpdated(snapshot) => {
                self.registry.merge(snapshot);
                self.clamp_selections();
            }
            CoreEvent::AdapterUpdated(adapter) => {
                self.scanning = adapter.discovering;
                self.adapter = Some(adapter);
            }
            CoreEvent::PairingExchangeStarted(exchange) => {
                // Started and Resolved come from different threads and may arrive swapped
                if exchange.id <= self.last_resolved {
                    tracing::debug!("Ignoring stale pairing exchange {}", exchange.id);
                    return;
                }
                let name = self.name_for_path(&exchange.device);
                self.set_status(format!(
                    "Confirm passkey {} for {}",
                    exchange.passkey_digits(),
                    name
                ));
                self.pending = Some(exchange);
            }
            CoreEvent::PairingExchangeResolved {
                exchange,
                resolution,
            } => {
                self.last_resolved = self.last_resolved.max(exchange.id);
                if self.pending.as_ref().map(|p| p.id) == Some(exchange.id) {
                    self.pending = None;
                }
                match resolution {
                    Resolution::Confirmed => self.set_status("Passkey confirmed, finishing pairing..."),
                    Resolution::Denied => self.set_error("Pairing denied"),
                    Resolution::Cancelled => self.set_error("Pairing cancelled by the device"),
                    Resolution::TimedOut => self.set_error("Pairing prompt timed out"),
                }
            }
            CoreEvent::OperationResult {
                address,
                operation,
                result,
            } => self.handle_result(address, operation, result),
            CoreEvent::PollFailed(e) => self.set_error(format!("Refresh failed: {}", e)),
        }
    }

    fn handle_result(&mut self, address: String, operation: Operation, result: Result<(), Error>) {
        if matches!(
            operation,
            Operation::Connect | Operation::Disconnect | Operation::Forget
        ) {
            self.busy = false;
            self.close_prompt();
        }

        if let Err(e) = result {
            self.set_error(e.to_string());
            return;
        }

        let name = self.name_for(&address);
        match operation {
            Operation::Connect => self.set_status(format!("Connected to {}", name)),
            Operation::Disconnect => self.set_status(format!("Disconnected from {}", name)),
            Operation::Forget => {
                self.registry.forget(&address);
                self.clamp_selections();
                self.set_status(format!("Forgot {}", name));
            }
            Operation::Scan { enable } => {
                self.scanning = enable;
                self.set_status(if enable {
                    "Scanning for devices"
                } else {
                    "Scanning stopped"
                });
            }
            Operation::SetAdapter(property) => {
                self.set_status(format!("Adapter {} updated", property));
                self.worker.poll();
            }
        }
    }

    /// Drops the prompt; an exchange still waiting on the operator is denied.
    fn close_prompt(&mut self) {
        if let Some(exchange) = self.pending.take() {
            self.coordinator.resolve(exchange.id, false);
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.close_prompt();
            self.should_quit = true;
            return;
        }

        if let Some(exchange) = self.pending.clone() {
            self.handle_prompt_key(&exchange, key.code);
            return;
        }

        if self.alias_input.is_some() {
            self.handle_alias_key(key.code);
            return;
        }

        if self.busy {
            if key.code == KeyCode::Char('q') {
                self.should_quit = true;
            }
            return;
        }

        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Up | KeyCode::Char('k') => self.previous_device(),
            KeyCode::Down | KeyCode::Char('j') => self.next_device(),
            KeyCode::Tab => self.next_panel(),
            KeyCode::Enter => self.toggle_connection(),
            KeyCode::Char('d') | KeyCode::Char('x') => self.forget_selected(),
            KeyCode::Char('s') => {
                self.set_status("Toggling scan...");
                self.worker.toggle_scanning();
            }
            KeyCode::Char('r') => {
                self.set_status("Refreshing...");
                self.worker.poll();
            }
            KeyCode::Char('p') => self.toggle_adapter(|a| AdapterProperty::Powered(!a.powered)),
            KeyCode::Char('v') => {
                self.toggle_adapter(|a| AdapterProperty::Discoverable(!a.discoverable))
            }
            KeyCode::Char('b') => self.toggle_adapter(|a| AdapterProperty::Pairable(!a.pairable)),
            KeyCode::Char('a') => self.start_alias_edit(),
            _ => {}
        }
    }

    fn handle_prompt_key(&mut self, exchange: &PairingExchange, code: KeyCode) {
        match code {
            KeyCode::Char('y') | KeyCode::Enter => {
                if self.coordinator.resolve(exchange.id, true) {
                    self.set_status("Confirming passkey...");
                } else {
                    self.drop_stale_prompt();
                }
            }
            KeyCode::Char('n') | KeyCode::Esc => {
                if self.coordinator.resolve(exchange.id, false) {
                    self.set_status("Denying pairing...");
                } else {
                    self.drop_stale_prompt();
                }
            }
            KeyCode::Char('q') => {
                self.close_prompt();
                self.should_quit = true;
            }
            _ => {}
        }
    }

    fn drop_stale_prompt(&mut self) {
        self.pending = None;
        self.set_error("Pairing request is no longer active");
    }

    fn handle_alias_key(&mut self, code: KeyCode) {
        let request = match code {
            KeyCode::Enter => return self.submit_alias(),
            KeyCode::Esc => {
                self.alias_input = None;
                self.set_status("Rename cancelled");
                return;
            }
            KeyCode::Char(c) => InputRequest::InsertChar(c),
            KeyCode::Backspace => InputRequest::DeletePrevChar,
            KeyCode::Delete => InputRequest::DeleteNextChar,
            KeyCode::Left => InputRequest::GoToPrevChar,
            KeyCode::Right => InputRequest::GoToNextChar,
            KeyCode::Home => InputRequest::GoToStart,
            KeyCode::End => InputRequest::GoToEnd,
            _ => return,
        };
        if let Some(input) = self.alias_input.as_mut() {
            input.handle(request);
        }
    }

    fn submit_alias(&mut self) {
        let Some(input) = self.alias_input.take() else {
            return;
        };
        let alias = input.value().trim().to_string();
        if alias.is_empty() {
            self.set_error("Alias cannot be empty");
        } else {
            self.set_status(format!("Renaming adapter to {}...", alias));
            self.worker.set_adapter(AdapterProperty::Alias(alias));
        }
    }

    fn start_alias_edit(&mut self) {
        let Some(adapter) = &self.adapter else {
            self.set_error("No adapter state yet");
            return;
        };
        let mut input = Input::new(adapter.alias.clone());
        input.handle(InputRequest::GoToEnd);
        self.alias_input = Some(input);
        self.set_status("Editing adapter alias (Enter to save, Esc to cancel)");
    }

    fn toggle_adapter(&mut self, property: impl FnOnce(&Adapter) -> AdapterProperty) {
        let Some(adapter) = &self.adapter else {
            self.set_error("No adapter state yet");
            return;
        };
        let property = property(adapter);
        self.set_status(format!("Setting {}...", property.name()));
        self.worker.set_adapter(property);
    }

    fn toggle_connection(&mut self) {
        let Some(device) = self.selected_device().cloned() else {
            return;
        };

        self.busy = true;
        let name = device.display_name().to_string();
        if device.connected {
            self.set_status(format!("Disconnecting from {}...", name));
            self.worker.disconnect(&device);
        } else {
            if device.paired {
                self.set_status(format!("Connecting to {}...", name));
            } else {
                self.set_status(format!("Pairing with {}...", name));
            }
            self.worker.connect(&device);
        }
    }

    fn forget_selected(&mut self) {
        let Some(device) = self.selected_device().cloned() else {
            return;
        };
        self.busy = true;
        self.set_status(format!("Forgetting {}...", device.display_name()));
        self.worker.forget(&device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{device, FakeGateway};
    use kyanos_core::events::{self, EventReceiver};
    use kyanos_core::registry::DeviceSnapshot;
    use kyanos_core::Command;

    fn app() -> (App, Arc<FakeGateway>, Arc<PairingCoordinator>, EventReceiver) {
        let gateway = Arc::new(FakeGateway::default());
        let (tx, rx) = events::channel();
        let config = Config {
            pairing_delay_ms: 0,
            disconnect_delay_ms: 0,
            ..Config::default()
        };
        let worker = Worker::new(gateway.clone(), tx.clone(), &config);
        let coordinator = Arc::new(PairingCoordinator::new(tx, None));
        let app = App::new(config, worker, coordinator.clone());
        (app, gateway, coordinator, rx)
    }

    fn snapshot(devices: &[Device]) -> DeviceSnapshot {
        devices
            .iter()
            .map(|dev| (dev.address.clone(), dev.clone()))
            .collect()
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    async fn next_result(app: &mut App, rx: &mut EventReceiver) {
        loop {
            let event = rx.recv().await.expect("event queue closed");
            let done = matches!(event, CoreEvent::OperationResult { .. });
            app.handle_event(event);
            if done {
                return;
            }
        }
    }

    #[tokio::test]
    async fn navigation_wraps_around() {
        let (mut app, _, _, _rx) = app();
        app.handle_event(CoreEvent::DevicesUpdated(snapshot(&[
            device("AA:BB:CC:DD:EE:01", false, false),
            device("AA:BB:CC:DD:EE:02", false, false),
        ])));

        app.handle_key(key(KeyCode::Up));
        assert_eq!(app.selected_available, 1);
        app.handle_key(key(KeyCode::Char('j')));
        assert_eq!(app.selected_available, 0);

        app.handle_key(key(KeyCode::Tab));
        assert_eq!(app.focus, Focus::Connected);
        assert!(app.selected_device().is_none());
    }

    #[tokio::test]
    async fn enter_pairs_and_connects_then_clears_busy() {
        let (mut app, gateway, _, mut rx) = app();
        let dev = device("AA:BB:CC:DD:EE:01", false, false);
        app.handle_event(CoreEvent::DevicesUpdated(snapshot(&[dev.clone()])));

        app.handle_key(key(KeyCode::Enter));
        assert!(app.busy);
        assert!(app.status.starts_with("Pairing with"));

        next_result(&mut app, &mut rx).await;
        assert!(!app.busy);
        assert!(!app.status_is_error);
        assert_eq!(gateway.calls().last(), Some(&Command::Connect(dev.path)));
    }

    #[tokio::test]
    async fn only_quit_is_accepted_while_busy() {
        let (mut app, _, _, _rx) = app();
        app.handle_event(CoreEvent::DevicesUpdated(snapshot(&[
            device("AA:BB:CC:DD:EE:01", false, false),
            device("AA:BB:CC:DD:EE:02", false, false),
        ])));
        app.busy = true;

        app.handle_key(key(KeyCode::Down));
        assert_eq!(app.selected_available, 0);
        app.handle_key(key(KeyCode::Char('q')));
        assert!(app.should_quit);
    }

    #[tokio::test]
    async fn failed_operation_reports_error_and_keeps_running() {
        let (mut app, gateway, _, mut rx) = app();
        gateway.fail("disconnect");
        app.handle_event(CoreEvent::DevicesUpdated(snapshot(&[device(
            "AA:BB:CC:DD:EE:01",
            true,
            true,
        )])));

        app.handle_key(key(KeyCode::Enter));
        next_result(&mut app, &mut rx).await;

        assert!(app.status_is_error);
        assert!(app.status.contains("AA:BB:CC:DD:EE:01"));
        assert!(!app.busy);
        assert!(!app.should_quit);
    }

    #[tokio::test]
    async fn forget_removes_device_and_clamps_selection() {
        let (mut app, _, _, mut rx) = app();
        app.handle_event(CoreEvent::DevicesUpdated(snapshot(&[
            device("AA:BB:CC:DD:EE:01", false, false),
            device("AA:BB:CC:DD:EE:02", false, false),
        ])));
        app.selected_available = 1;
        let doomed = app.selected_device().unwrap().address.clone();

        app.handle_key(key(KeyCode::Char('d')));
        next_result(&mut app, &mut rx).await;

        assert!(app.registry.get(&doomed).is_none());
        assert_eq!(app.registry.len(), 1);
        assert_eq!(app.selected_available, 0);
    }

    #[tokio::test]
    async fn prompt_confirms_pending_exchange() {
        let (mut app, _, coordinator, mut rx) = app();
        let daemon = {
            let coordinator = coordinator.clone();
            tokio::task::spawn_blocking(move || {
                coordinator.request_confirmation("/org/bluez/hci0/dev_AA_BB_CC_DD_EE_01", 4321)
            })
        };

        let event = rx.recv().await.unwrap();
        app.handle_event(event);
        let exchange = app.pending.clone().expect("prompt shown");
        assert_eq!(exchange.passkey_digits(), "004321");
        assert!(app.status.contains("004321"));

        // Keys meant for the lists are swallowed by the prompt
        app.handle_key(key(KeyCode::Char('d')));
        assert!(!app.busy);

        app.handle_key(key(KeyCode::Char('y')));
        assert!(daemon.await.unwrap().is_ok());

        let event = rx.recv().await.unwrap();
        app.handle_event(event);
        assert!(app.pending.is_none());
        assert!(!app.status_is_error);
    }

    #[tokio::test]
    async fn quitting_from_prompt_denies_the_exchange() {
        let (mut app, _, coordinator, mut rx) = app();
        let daemon = {
            let coordinator = coordinator.clone();
            tokio::task::spawn_blocking(move || coordinator.display_passkey("/dev", 99, 0))
        };

        let event = rx.recv().await.unwrap();
        app.handle_event(event);
        app.handle_key(key(KeyCode::Char('q')));

        assert!(app.should_quit);
        assert!(app.pending.is_none());
        assert!(daemon.await.unwrap().is_err());
    }

    fn exchange(id: u64) -> PairingExchange {
        PairingExchange {
            id,
            device: "/org/bluez/hci0/dev_AA_BB_CC_DD_EE_01".into(),
            kind: kyanos_core::agent::ExchangeKind::Confirmation,
            passkey: 123_456,
        }
    }

    #[tokio::test]
    async fn late_start_for_resolved_exchange_opens_no_prompt() {
        let (mut app, _, _, _rx) = app();
        app.handle_event(CoreEvent::PairingExchangeResolved {
            exchange: exchange(7),
            resolution: Resolution::Cancelled,
        });
        app.handle_event(CoreEvent::PairingExchangeStarted(exchange(7)));
        assert!(app.pending.is_none());

        // Keys reach the lists again
        app.handle_key(key(KeyCode::Char('r')));
        assert_eq!(app.status, "Refreshing...");

        app.handle_event(CoreEvent::PairingExchangeStarted(exchange(8)));
        assert_eq!(app.pending.as_ref().map(|p| p.id), Some(8));
    }

    #[tokio::test]
    async fn answering_a_dead_exchange_closes_the_prompt() {
        let (mut app, _, _, _rx) = app();
        // Never registered with the coordinator, so resolve reports it gone
        app.handle_event(CoreEvent::PairingExchangeStarted(exchange(3)));
        assert!(app.pending.is_some());

        app.handle_key(key(KeyCode::Char('y')));
        assert!(app.pending.is_none());
        assert!(app.status_is_error);

        app.handle_event(CoreEvent::PairingExchangeStarted(exchange(4)));
        app.handle_key(key(KeyCode::Esc));
        assert!(app.pending.is_none());
        assert!(!app.should_quit);
    }

    #[tokio::test]
    async fn alias_edit_sets_adapter_alias() {
        let (mut app, gateway, _, mut rx) = app();
        app.handle_event(CoreEvent::AdapterUpdated(Adapter {
            path: "/org/bluez/hci0".into(),
            alias: "desk".into(),
            ..Adapter::default()
        }));

        app.handle_key(key(KeyCode::Char('a')));
        app.handle_key(key(KeyCode::Char('-')));
        app.handle_key(key(KeyCode::Char('2')));
        // Editing swallows command keys
        app.handle_key(key(KeyCode::Char('q')));
        app.handle_key(key(KeyCode::Backspace));
        app.handle_key(key(KeyCode::Enter));
        assert!(app.alias_input.is_none());

        next_result(&mut app, &mut rx).await;
        assert!(!app.should_quit);
        assert!(gateway
            .calls()
            .contains(&Command::SetAdapter(AdapterProperty::Alias("desk-2".into()))));
    }

    #[tokio::test]
    async fn adapter_updates_drive_scanning_flag() {
        let (mut app, _, _, _rx) = app();
        app.handle_event(CoreEvent::AdapterUpdated(Adapter {
            discovering: true,
            ..Adapter::default()
        }));
        assert!(app.scanning);
    }
}
