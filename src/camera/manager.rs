use super::device::{
    CameraConstraintProfile, CameraDevice, CameraStream, Capability, ConstraintSet,
    ConstraintUpdate, DeviceCapabilities, FocusMode,
};
use crate::error::{AcquireError, DeviceError};
use crate::models::Frame;
use tracing::{debug, info, warn};

/// Owns a camera device and at most one live stream
///
/// Capabilities are read once at acquisition and never change afterwards.
/// Torch, zoom and focus are the only mutable device state and only this
/// type touches them; toggles never fail loudly, they return `false`.
pub struct CameraSessionManager<D: CameraDevice> {
    device: D,
    stream: Option<D::Stream>,
    capabilities: Option<DeviceCapabilities>,
    active_constraints: Option<ConstraintSet>,
    torch_on: bool,
    zoom_level: Option<f32>,
    focus_mode: Option<FocusMode>,
}

impl<D: CameraDevice> CameraSessionManager<D> {
    /// Wrap a device; nothing is opened yet
    pub fn new(device: D) -> Self {
        Self {
            device,
            stream: None,
            capabilities: None,
            active_constraints: None,
            torch_on: false,
            zoom_level: None,
            focus_mode: None,
        }
    }

    /// Walk the constraint ladder; the first set the device accepts wins
    ///
    /// Any stream held from an earlier acquisition is released first. Every
    /// rung is tried; when all fail, a permission refusal seen on any rung
    /// wins the classification, otherwise the last failure does.
    pub async fn acquire(
        &mut self,
        profile: &CameraConstraintProfile,
    ) -> Result<DeviceCapabilities, AcquireError> {
        self.release().await;

        let mut last_error: Option<DeviceError> = None;
        let mut refusal: Option<DeviceError> = None;
        for (rung, constraints) in profile.sets().iter().enumerate() {
            debug!(rung, constraints = %constraints.describe(), "Requesting camera");
            match self.device.acquire(constraints).await {
                Ok(stream) => {
                    let capabilities = stream.capabilities();
                    info!(
                        rung,
                        constraints = %constraints.describe(),
                        torch = capabilities.torch,
                        zoom = capabilities.zoom.is_some(),
                        "Camera acquired"
                    );
                    self.stream = Some(stream);
                    self.capabilities = Some(capabilities.clone());
                    self.active_constraints = Some(constraints.clone());
                    return Ok(capabilities);
                }
                Err(err) => {
                    warn!(rung, constraints = %constraints.describe(), error = %err, "Camera constraints rejected");
                    if refusal.is_none() && matches!(err, DeviceError::NotAllowed(_)) {
                        refusal = Some(err.clone());
                    }
                    last_error = Some(err);
                }
            }
        }

        let classified = match refusal.or(last_error) {
            Some(err) => AcquireError::classify(&err),
            None => AcquireError::UnsupportedConstraint("empty constraint ladder".to_string()),
        };
        warn!(error = %classified, "Camera acquisition failed");
        Err(classified)
    }

    /// Whether a stream is currently held
    pub fn is_acquired(&self) -> bool {
        self.stream.is_some()
    }

    /// Capabilities of the live stream
    pub fn capabilities(&self) -> Option<&DeviceCapabilities> {
        self.capabilities.as_ref()
    }

    /// Constraint set that produced the live stream
    pub fn active_constraints(&self) -> Option<&ConstraintSet> {
        self.active_constraints.as_ref()
    }

    /// Whether the live stream offers `capability`
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities
            .as_ref()
            .is_some_and(|caps| caps.supports(capability))
    }

    /// Current torch state
    pub fn torch_on(&self) -> bool {
        self.torch_on
    }

    /// Current zoom level, if one was set
    pub fn zoom_level(&self) -> Option<f32> {
        self.zoom_level
    }

    /// Current focus mode, if one was set
    pub fn focus_mode(&self) -> Option<FocusMode> {
        self.focus_mode
    }

    /// Switch the torch; `false` if unsupported or the device refused,
    /// in which case the torch state is left as it was
    pub async fn set_torch(&mut self, on: bool) -> bool {
        if !self.supports(Capability::Torch) {
            debug!(on, "Torch not supported");
            return false;
        }
        if self.torch_on == on {
            return true;
        }
        let update = ConstraintUpdate {
            torch: Some(on),
            ..Default::default()
        };
        if self.apply(&update).await {
            self.torch_on = on;
            info!(on, "Torch toggled");
            true
        } else {
            false
        }
    }

    /// Set zoom, clamped into the advertised range
    pub async fn set_zoom(&mut self, level: f32) -> bool {
        let Some(range) = self.capabilities.as_ref().and_then(|caps| caps.zoom) else {
            debug!(level, "Zoom not supported");
            return false;
        };
        let level = range.clamp(level);
        let update = ConstraintUpdate {
            zoom: Some(level),
            ..Default::default()
        };
        if self.apply(&update).await {
            self.zoom_level = Some(level);
            true
        } else {
            false
        }
    }

    /// Switch focus mode if the device lists it
    pub async fn set_focus_mode(&mut self, mode: FocusMode) -> bool {
        let listed = self
            .capabilities
            .as_ref()
            .is_some_and(|caps| caps.focus_modes.contains(&mode));
        if !listed {
            debug!(?mode, "Focus mode not supported");
            return false;
        }
        let update = ConstraintUpdate {
            focus_mode: Some(mode),
            ..Default::default()
        };
        if self.apply(&update).await {
            self.focus_mode = Some(mode);
            true
        } else {
            false
        }
    }

    async fn apply(&mut self, update: &ConstraintUpdate) -> bool {
        let Some(stream) = self.stream.as_mut() else {
            return false;
        };
        match stream.apply_constraints(update).await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, ?update, "Device rejected constraint update");
                false
            }
        }
    }

    /// Latest frame from the live stream
    pub fn current_frame(&mut self) -> Option<Frame> {
        self.stream.as_mut()?.current_frame()
    }

    /// Stop the stream; calling again is a no-op
    pub async fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop().await;
            info!("Camera released");
        }
        self.capabilities = None;
        self.active_constraints = None;
        self.torch_on = false;
        self.zoom_level = None;
        self.focus_mode = None;
    }

    /// Borrow the wrapped device
    pub fn device(&self) -> &D {
        &self.device
    }
}
