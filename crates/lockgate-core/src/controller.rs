//! Login controller
//!
//! Owns the login form state and drives it through its transitions:
//!
//! - field edits (pure updates, ignored while loading or locked out)
//! - login attempts, gated on the cached connectivity status
//! - failure bookkeeping and the timed lockout
//! - connectivity messages
//!
//! Every transition goes through the state channel's sender, so transitions
//! never interleave. The lockout countdown and the connectivity subscription
//! are the only background tasks; both hold a weak reference back to the
//! controller and are aborted when it is dropped.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::auth::{AuthFailure, Authenticator};
use crate::clock::{Clock, SystemClock};
use crate::connectivity::ConnectivityPublisher;
use crate::lockout::LockoutPolicy;
use crate::schedule::{RepeatingTask, Tick};
use crate::state::{LoginPhase, LoginState, StateSnapshot, MIN_PASSWORD_LENGTH, OFFLINE_MESSAGE};
use crate::store::CredentialStore;

/// Shown when a failed attempt could not be recorded
pub const UNRECORDED_FAILURE_MESSAGE: &str = "Login failed";

/// Tunables for a controller
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerSettings {
    /// Failure threshold and lockout length
    pub policy: LockoutPolicy,
    /// Countdown tick interval
    pub tick_interval: Duration,
    /// Minimum password length for the login button
    pub min_password_len: usize,
    /// Upper bound on one authentication call
    pub auth_timeout: Option<Duration>,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            policy: LockoutPolicy::default(),
            tick_interval: Duration::from_secs(1),
            min_password_len: MIN_PASSWORD_LENGTH,
            auth_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// What a call to [`LoginController::login`] did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Button disabled (invalid fields, loading or locked out); nothing happened
    Ignored,
    /// Offline; the authenticator was not called and nothing was counted
    Offline,
    /// Authenticated; the front end should navigate away
    Succeeded,
    /// Rejected below the lockout threshold
    Failed { attempt: u32, threshold: u32 },
    /// Rejected and the form is now locked
    LockedOut { seconds: u64 },
    /// Rejected, but the failure could not be persisted
    Unrecorded,
}

/// State shared with the background tasks
struct Shared {
    state: watch::Sender<LoginState>,
    store: Arc<dyn CredentialStore>,
    authenticator: Arc<dyn Authenticator>,
    connectivity: Arc<dyn ConnectivityPublisher>,
    clock: Arc<dyn Clock>,
    settings: ControllerSettings,
    /// At most one running countdown
    countdown: Mutex<Option<RepeatingTask>>,
}

fn lock_countdown(slot: &Mutex<Option<RepeatingTask>>) -> MutexGuard<'_, Option<RepeatingTask>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Clears Loading when a login future is dropped before its result is handled
struct PendingAttempt<'a> {
    state: &'a watch::Sender<LoginState>,
    handled: bool,
}

impl Drop for PendingAttempt<'_> {
    fn drop(&mut self) {
        if self.handled {
            return;
        }
        debug!("Login attempt abandoned before the authenticator answered");
        self.state.send_if_modified(|state| {
            let was_loading = state.is_loading;
            state.is_loading = false;
            was_loading
        });
    }
}

/// Builder for [`LoginController`]
pub struct ControllerBuilder {
    store: Arc<dyn CredentialStore>,
    authenticator: Arc<dyn Authenticator>,
    connectivity: Arc<dyn ConnectivityPublisher>,
    clock: Arc<dyn Clock>,
    settings: ControllerSettings,
}

impl ControllerBuilder {
    /// Use a different clock (defaults to the system clock)
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use different settings
    pub fn settings(mut self, settings: ControllerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Start the controller
    ///
    /// Must be called inside a tokio runtime. Applies the current
    /// connectivity status, resumes a persisted lockout and subscribes to
    /// connectivity changes.
    pub fn start(self) -> LoginController {
        let (state, _) = watch::channel(LoginState::default());
        let shared = Arc::new(Shared {
            state,
            store: self.store,
            authenticator: self.authenticator,
            connectivity: self.connectivity,
            clock: self.clock,
            settings: self.settings,
            countdown: Mutex::new(None),
        });

        let mut connectivity_rx = shared.connectivity.subscribe();
        let initial = *connectivity_rx.borrow_and_update();
        shared.apply_connectivity(initial);
        shared.resume_persisted_lockout();

        let subscription = spawn_connectivity_watch(&shared, connectivity_rx, initial);

        LoginController {
            shared,
            subscription,
        }
    }
}

/// Login form controller
pub struct LoginController {
    shared: Arc<Shared>,
    /// Connectivity subscription, released on drop
    subscription: JoinHandle<()>,
}

impl LoginController {
    /// Start building a controller around its collaborators
    pub fn builder(
        store: Arc<dyn CredentialStore>,
        authenticator: Arc<dyn Authenticator>,
        connectivity: Arc<dyn ConnectivityPublisher>,
    ) -> ControllerBuilder {
        ControllerBuilder {
            store,
            authenticator,
            connectivity,
            clock: Arc::new(SystemClock),
            settings: ControllerSettings::default(),
        }
    }

    /// Current state
    pub fn state(&self) -> LoginState {
        self.shared.state.borrow().clone()
    }

    /// Current state in its externally observable shape
    pub fn snapshot(&self) -> StateSnapshot {
        self.shared
            .state
            .borrow()
            .snapshot(self.shared.settings.min_password_len)
    }

    /// Current phase
    pub fn phase(&self) -> LoginPhase {
        self.shared.state.borrow().phase()
    }

    /// Whether the login button is enabled right now
    pub fn is_login_button_enabled(&self) -> bool {
        self.shared
            .state
            .borrow()
            .is_login_button_enabled(self.shared.settings.min_password_len)
    }

    /// Receiver of every published state
    pub fn subscribe(&self) -> watch::Receiver<LoginState> {
        self.shared.state.subscribe()
    }

    /// Settings this controller runs with
    pub fn settings(&self) -> &ControllerSettings {
        &self.shared.settings
    }

    /// Token persisted by an earlier "remember me" login
    pub fn remembered_token(&self) -> Option<String> {
        match self.shared.store.saved_token() {
            Ok(token) => token,
            Err(e) => {
                warn!("Failed to read remembered token: {}", e);
                None
            }
        }
    }

    /// Set the username, trimming surrounding whitespace
    pub fn on_username_change(&self, text: &str) {
        let username = text.trim().to_string();
        self.edit(|state| state.username = username);
    }

    /// Set the password as typed
    pub fn on_password_change(&self, text: &str) {
        let password = text.to_string();
        self.edit(|state| state.password = password);
    }

    /// Set whether the token is kept after a successful login
    pub fn on_remember_me_change(&self, remember_me: bool) {
        self.edit(|state| state.remember_me = remember_me);
    }

    /// Apply a field edit unless the form is busy or locked
    fn edit(&self, apply: impl FnOnce(&mut LoginState)) {
        self.shared.state.send_if_modified(|state| {
            if !state.accepts_input() {
                return false;
            }
            let before = state.clone();
            apply(state);
            *state != before
        });
    }

    /// Attempt a login with the current fields
    ///
    /// Does nothing unless the login button is enabled. Checks the cached
    /// connectivity status before calling the authenticator, and awaits the
    /// authenticator exactly once. Dropping the future before it resolves
    /// leaves the form usable and counts nothing.
    pub async fn login(&self) -> AttemptOutcome {
        let shared = &self.shared;
        let min_len = shared.settings.min_password_len;
        let online = shared.connectivity.is_online();

        let mut submitted = None;
        let mut offline = false;
        shared.state.send_if_modified(|state| {
            if !state.is_login_button_enabled(min_len) {
                return false;
            }
            if !online {
                offline = true;
                let changed = state.error_message.as_deref() != Some(OFFLINE_MESSAGE);
                state.error_message = Some(OFFLINE_MESSAGE.to_string());
                return changed;
            }
            state.is_loading = true;
            state.error_message = None;
            submitted = Some((
                state.username.clone(),
                state.password.clone(),
                state.remember_me,
            ));
            true
        });

        if offline {
            info!("Login blocked: no internet connection");
            return AttemptOutcome::Offline;
        }
        let Some((username, password, remember_me)) = submitted else {
            return AttemptOutcome::Ignored;
        };
        let mut pending = PendingAttempt {
            state: &shared.state,
            handled: false,
        };

        debug!("Submitting login attempt for {}", username);
        let call = shared.authenticator.login(&username, &password, online);
        let result = match shared.settings.auth_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => Err(AuthFailure::new(format!(
                    "No response within {}s",
                    limit.as_secs()
                ))),
            },
            None => call.await,
        };

        let outcome = match result {
            Ok(token) => shared.handle_success(token, remember_me),
            Err(failure) => shared.handle_failure(failure),
        };
        pending.handled = true;
        outcome
    }

    /// Stop the lockout countdown, if one is running
    pub fn cancel_lockout_timer(&self) {
        if let Some(task) = lock_countdown(&self.shared.countdown).take() {
            task.cancel();
            debug!("Lockout countdown cancelled");
        }
    }

    /// Whether a lockout countdown is still ticking
    pub fn is_countdown_running(&self) -> bool {
        lock_countdown(&self.shared.countdown)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Stop the countdown and release the connectivity subscription
    pub fn shutdown(&self) {
        self.cancel_lockout_timer();
        self.subscription.abort();
    }
}

impl Drop for LoginController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Shared {
    fn handle_success(&self, token: String, remember_me: bool) -> AttemptOutcome {
        let saved = remember_me.then_some(token);
        if let Err(e) = self.store.save_token(saved) {
            warn!("Failed to persist remembered token: {}", e);
        }
        if let Err(e) = self.store.reset_failure_count() {
            warn!("Failed to reset failure count: {}", e);
        }

        self.state.send_modify(|state| {
            state.navigate_to_home = true;
            state.is_loading = false;
        });
        info!("Login succeeded");
        AttemptOutcome::Succeeded
    }

    fn handle_failure(self: &Arc<Self>, failure: AuthFailure) -> AttemptOutcome {
        debug!("{}", failure);

        let recorded = self
            .store
            .increment_failure_count()
            .and_then(|_| self.store.failure_count());
        let count = match recorded {
            Ok(count) => count,
            Err(e) => {
                warn!("Failed to record login failure: {}", e);
                self.state.send_modify(|state| {
                    state.is_loading = false;
                    state.error_message = Some(UNRECORDED_FAILURE_MESSAGE.to_string());
                });
                return AttemptOutcome::Unrecorded;
            }
        };

        let policy = &self.settings.policy;
        if !policy.is_locked(count) {
            let message = policy.failure_message(count);
            info!("{}", message);
            self.state.send_modify(|state| {
                state.is_loading = false;
                state.error_message = Some(message);
            });
            return AttemptOutcome::Failed {
                attempt: count,
                threshold: policy.threshold,
            };
        }

        let now = self.clock.now_millis();
        let deadline = policy.deadline(now);
        if let Err(e) = self.store.set_lockout_until(deadline) {
            warn!("Failed to persist lockout deadline: {}", e);
        }

        let seconds = LockoutPolicy::remaining_seconds(deadline, now);
        self.state.send_modify(|state| {
            state.is_loading = false;
            state.is_locked_out = true;
            state.lockout_seconds_remaining = seconds;
        });
        warn!(
            "Login locked after {} failed attempts ({}s)",
            count, seconds
        );

        self.start_countdown(deadline);
        AttemptOutcome::LockedOut { seconds }
    }

    /// Apply a connectivity status to the error message
    fn apply_connectivity(&self, online: bool) {
        let next = (!online).then(|| OFFLINE_MESSAGE.to_string());
        self.state.send_if_modified(|state| {
            if state.error_message == next {
                return false;
            }
            state.error_message = next;
            true
        });
    }

    /// Pick up a lockout that outlived the previous process
    fn resume_persisted_lockout(self: &Arc<Self>) {
        let deadline = match self.store.lockout_until() {
            Ok(Some(deadline)) => deadline,
            Ok(None) => return,
            Err(e) => {
                warn!("Failed to read persisted lockout: {}", e);
                return;
            }
        };

        let seconds = LockoutPolicy::remaining_seconds(deadline, self.clock.now_millis());
        if seconds == 0 {
            debug!("Persisted lockout already expired");
            self.expire_lockout();
            return;
        }

        info!("Resuming lockout: {}s remaining", seconds);
        self.state.send_modify(|state| {
            state.is_locked_out = true;
            state.lockout_seconds_remaining = seconds;
        });
        self.start_countdown(deadline);
    }

    /// Replace any running countdown with one ending at `deadline`
    fn start_countdown(self: &Arc<Self>, deadline: i64) {
        let mut slot = lock_countdown(&self.countdown);
        if let Some(previous) = slot.take() {
            previous.cancel();
        }

        let weak: Weak<Shared> = Arc::downgrade(self);
        *slot = Some(RepeatingTask::spawn(self.settings.tick_interval, move || {
            match weak.upgrade() {
                Some(shared) => shared.countdown_tick(deadline),
                None => Tick::Stop,
            }
        }));
    }

    fn countdown_tick(&self, deadline: i64) -> Tick {
        let remaining = LockoutPolicy::remaining_seconds(deadline, self.clock.now_millis());
        if remaining == 0 {
            self.expire_lockout();
            return Tick::Stop;
        }

        self.state.send_if_modified(|state| {
            let changed =
                !state.is_locked_out || state.lockout_seconds_remaining != remaining;
            state.is_locked_out = true;
            state.lockout_seconds_remaining = remaining;
            changed
        });
        Tick::Continue
    }

    fn expire_lockout(&self) {
        if let Err(e) = self.store.reset_failure_count() {
            warn!("Failed to reset failure count: {}", e);
        }
        if let Err(e) = self.store.clear_lockout_until() {
            warn!("Failed to clear lockout deadline: {}", e);
        }

        self.state.send_modify(|state| {
            state.is_locked_out = false;
            state.lockout_seconds_remaining = 0;
        });
        info!("Lockout lifted");
    }
}

/// Follow connectivity changes for the controller's lifetime
fn spawn_connectivity_watch(
    shared: &Arc<Shared>,
    mut rx: watch::Receiver<bool>,
    initial: bool,
) -> JoinHandle<()> {
    let weak = Arc::downgrade(shared);
    tokio::spawn(async move {
        let mut last = initial;
        while rx.changed().await.is_ok() {
            let online = *rx.borrow_and_update();
            if online == last {
                continue;
            }
            last = online;

            let Some(shared) = weak.upgrade() else {
                break;
            };
            debug!("Connectivity is now {}", if online { "online" } else { "offline" });
            shared.apply_connectivity(online);
        }
    })
}
