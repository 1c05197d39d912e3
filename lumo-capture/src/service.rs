//! The capture service: grab a frame each cycle, push it downstream.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use lumo_core::{DelayTimer, SettingKey, SettingsStore, STATE_OK};
use lumo_service::{Service, ServiceContext, ServiceError, WorkError};

use crate::frame::FrameSource;
use crate::led::{LedClient, LedEndpoint, LedFault};
use crate::settings;

/// How long the controller keeps a frame lit; the next frame always arrives
/// sooner while the service is enabled.
const FRAME_DURATION_MS: u64 = 500;

/// Screen-capture worker.
///
/// Each cycle: apply any settings changes flagged by the unit callbacks,
/// reconnect the LED client if it dropped, grab a scaled frame, send it, and
/// sit out the rest of the cadence interval. LED faults bubble up as
/// downstream faults so the runtime publishes an error state and backs off.
pub struct CaptureService<L, F> {
    led: L,
    source: F,
    timer: DelayTimer,
    endpoint_dirty: Rc<Cell<bool>>,
    cadence_dirty: Rc<Cell<bool>>,
}

impl<L: LedClient, F: FrameSource> CaptureService<L, F> {
    pub fn new(led: L, source: F) -> Self {
        Self {
            led,
            source,
            timer: DelayTimer::new(Duration::from_millis(33)),
            endpoint_dirty: Rc::new(Cell::new(false)),
            cadence_dirty: Rc::new(Cell::new(false)),
        }
    }

    fn reconfigure_led(&mut self, store: &SettingsStore) -> Result<(), ServiceError> {
        let address = store.string(&SettingKey::from(settings::LED_ADDRESS))?.to_owned();
        let port = store.int(&SettingKey::from(settings::LED_PORT))?.clamp(1, u16::MAX as i64) as u16;
        self.led.disconnect();
        self.led.configure(LedEndpoint { address, port });
        Ok(())
    }

    fn retime(&mut self, store: &SettingsStore) -> Result<(), ServiceError> {
        let rate = store.int(&SettingKey::from(settings::FRAME_RATE))?.max(1);
        self.timer.set_interval(Duration::from_secs_f64(1.0 / rate as f64));
        Ok(())
    }
}

fn downstream(fault: LedFault) -> WorkError {
    WorkError::Downstream(fault.message().to_owned())
}

impl<L: LedClient, F: FrameSource> Service for CaptureService<L, F> {
    fn name(&self) -> &'static str {
        "capture"
    }

    fn requires_settings(&self) -> bool {
        true
    }

    fn register_settings(&mut self, store: &mut SettingsStore) {
        let endpoint_dirty = Rc::clone(&self.endpoint_dirty);
        store.register_unit(
            [
                SettingKey::from(settings::LED_ADDRESS),
                SettingKey::from(settings::LED_PORT),
            ],
            Some(Box::new(move || endpoint_dirty.set(true))),
        );

        let cadence_dirty = Rc::clone(&self.cadence_dirty);
        store.register_unit(
            [SettingKey::from(settings::FRAME_RATE)],
            Some(Box::new(move || cadence_dirty.set(true))),
        );

        // Geometry and priority are read fresh each cycle; no callback.
        store.register_unit(
            [
                SettingKey::from(settings::SCALE_WIDTH),
                SettingKey::from(settings::SCALE_HEIGHT),
                SettingKey::from(settings::PRIORITY),
            ],
            None,
        );
    }

    fn setup(&mut self, ctx: &mut ServiceContext<'_>) -> Result<(), ServiceError> {
        self.reconfigure_led(ctx.settings())?;
        self.retime(ctx.settings())?;
        self.endpoint_dirty.set(false);
        self.cadence_dirty.set(false);
        ctx.update_state(STATE_OK, None)
    }

    fn on_enable(
        &mut self,
        enable: bool,
        _ctx: &mut ServiceContext<'_>,
    ) -> Result<(), ServiceError> {
        if enable {
            // Connect eagerly; a failure here is retried on the first work
            // cycle and recovered through the fault path.
            if let Err(fault) = self.led.connect() {
                tracing::warn!(error = %fault, "LED connect on enable failed");
            }
        } else {
            self.led.disconnect();
        }
        Ok(())
    }

    fn on_shutdown(&mut self, _ctx: &mut ServiceContext<'_>) -> Result<(), ServiceError> {
        self.led.disconnect();
        Ok(())
    }

    fn run_once(&mut self, ctx: &mut ServiceContext<'_>) -> Result<(), WorkError> {
        self.timer.mark_start();

        // Settings changed since the last cycle?
        if self.endpoint_dirty.take() {
            self.reconfigure_led(ctx.settings())?;
        }
        if self.cadence_dirty.take() {
            self.retime(ctx.settings())?;
        }

        let width = ctx.settings().int(&SettingKey::from(settings::SCALE_WIDTH))?.max(1) as u32;
        let height = ctx.settings().int(&SettingKey::from(settings::SCALE_HEIGHT))?.max(1) as u32;
        let priority = ctx.settings().int(&SettingKey::from(settings::PRIORITY))?;

        if !self.led.is_connected() {
            self.led.connect().map_err(downstream)?;
            ctx.update_state(STATE_OK, None)?;
        }

        let frame = self
            .source
            .grab(width, height)
            .map_err(|fault| WorkError::Fatal(Box::new(fault)))?;
        self.led
            .send_frame(&frame, priority, FRAME_DURATION_MS)
            .map_err(downstream)?;

        self.timer.wait_remainder();
        Ok(())
    }
}
