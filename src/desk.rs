//! Foreground actions
//!
//! Everything a user explicitly asks for: submitting a request (through the
//! guest gate), supplier and authority write-throughs, SOS alerts, routing.
//! Unlike background sync these surface their failures, and refuse to run
//! while offline.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::directory::{CenterPatch, DirectoryClient};
use crate::error::{CoreError, Result};
use crate::guest::GuestGate;
use crate::model::{
    AidRequest, CanonicalId, CenterStatus, CrowdLevel, DeliveryType, HazardZone, LatLng,
    LocalIdentity, NewHazardZone, NewSosAlert, Record, ReliefCenter, RequestDraft,
};
use crate::routing::{RouteOutcome, RoutePlanner, TransitSimulator};
use crate::sync::merge::{upsert, without};
use crate::sync::{ResourceKind, SyncEngine};

/// Radius used for hazard zones reported without one
pub const DEFAULT_HAZARD_RADIUS_M: f64 = 500.0;

/// What the requester filled in
#[derive(Debug, Clone, PartialEq)]
pub struct RequestForm {
    pub item_name: String,
    pub quantity: f64,
    pub center: Option<ReliefCenter>,
    pub delivery_type: DeliveryType,
    pub is_priority: bool,
}

/// A submission parked behind the guest gate
#[derive(Debug, Clone)]
pub struct PendingSubmission {
    pub form: RequestForm,
    pub origin: Option<LatLng>,
}

#[derive(Debug)]
pub enum SubmitOutcome {
    /// The identity is an unverified guest; the submission waits for a code.
    VerificationRequired,
    Submitted {
        draft: RequestDraft,
        route: Option<RouteOutcome>,
        /// Generation of the transit run started for a delivery
        transit: Option<u64>,
    },
}

pub struct ActionDesk {
    engine: Arc<SyncEngine>,
    planner: RoutePlanner,
    gate: Mutex<GuestGate<PendingSubmission>>,
    transit: Mutex<TransitSimulator>,
}

impl ActionDesk {
    pub fn new(
        engine: Arc<SyncEngine>,
        planner: RoutePlanner,
        gate: GuestGate<PendingSubmission>,
        transit: TransitSimulator,
    ) -> Self {
        Self {
            engine,
            planner,
            gate: Mutex::new(gate),
            transit: Mutex::new(transit),
        }
    }

    pub fn gate(&self) -> &Mutex<GuestGate<PendingSubmission>> {
        &self.gate
    }

    pub fn transit(&self) -> &Mutex<TransitSimulator> {
        &self.transit
    }

    fn directory(&self) -> &Arc<dyn DirectoryClient> {
        self.engine.directory()
    }

    fn ensure_online(&self, action: &str) -> Result<()> {
        if self.engine.connectivity().is_online() {
            Ok(())
        } else {
            Err(CoreError::Offline(format!("cannot {} while offline", action)))
        }
    }

    async fn identity(&self) -> Result<LocalIdentity> {
        self.engine
            .store()
            .lock()
            .await
            .load_identity()?
            .ok_or_else(|| CoreError::Validation("You must be logged in to request food.".to_string()))
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Submit an aid request from `origin`.
    ///
    /// Unverified guests get [`SubmitOutcome::VerificationRequired`] and the
    /// submission is resumed by [`ActionDesk::verify_guest`].
    pub async fn submit(&self, form: RequestForm, origin: Option<LatLng>) -> Result<SubmitOutcome> {
        validate_form(&form)?;
        let identity = self.identity().await?;
        self.ensure_online("submit a request")?;

        if identity.needs_verification() {
            info!("Guest must verify a phone number before submitting");
            self.gate.lock().await.defer(PendingSubmission { form, origin });
            return Ok(SubmitOutcome::VerificationRequired);
        }

        self.submit_as(&identity, form, origin).await
    }

    async fn submit_as(
        &self,
        identity: &LocalIdentity,
        form: RequestForm,
        origin: Option<LatLng>,
    ) -> Result<SubmitOutcome> {
        let draft = RequestDraft {
            consumer_name: if identity.name.trim().is_empty() {
                "Guest".to_string()
            } else {
                identity.name.clone()
            },
            item_name: form.item_name.trim().to_string(),
            quantity: form.quantity,
            center_id: form.center.as_ref().map(|c| c.id.to_json()),
            center_name: form.center.as_ref().map(|c| c.name.clone()),
            delivery_type: form.delivery_type,
            phone: identity
                .phone
                .clone()
                .unwrap_or_else(|| "Not Provided".to_string()),
            is_priority: form.is_priority,
        };

        let echo = self.directory().submit_request(&draft).await?;
        info!(item = %draft.item_name, delivery = ?draft.delivery_type, "Request submitted");
        self.absorb_echo(echo).await;

        let (Some(user), Some(center)) = (origin, form.center.as_ref()) else {
            return Ok(SubmitOutcome::Submitted {
                draft,
                route: None,
                transit: None,
            });
        };

        let hazards = self.engine.state().hazards.snapshot().await;
        let (route, transit) = match form.delivery_type {
            // The truck drives from the center to the requester
            DeliveryType::Delivery => {
                let route = self
                    .planner
                    .plan_route(Some(center.location()), Some(user), &hazards)
                    .await?;
                let generation = self
                    .transit
                    .lock()
                    .await
                    .start_transit(route.plan.waypoints.clone())?;
                (route, Some(generation))
            }
            DeliveryType::Pickup => {
                let route = self
                    .planner
                    .plan_route(Some(user), Some(center.location()), &hazards)
                    .await?;
                (route, None)
            }
        };

        Ok(SubmitOutcome::Submitted {
            draft,
            route: Some(route),
            transit,
        })
    }

    /// Put the server's echo of a new request into the local view, if it decodes.
    async fn absorb_echo(&self, echo: Value) {
        let Ok(request) = AidRequest::decode(echo) else {
            return;
        };
        let requests = &self.engine.state().requests;
        if let Err(e) = self
            .engine
            .replace_local(ResourceKind::Requests, requests, |current| upsert(current, request))
            .await
        {
            warn!(error = %e, "Could not cache submitted request");
        }
    }

    /// Ask the OTP service for a code for the guest's phone.
    pub async fn send_guest_code(&self, phone: &str) -> Result<String> {
        self.ensure_online("request a code")?;
        self.gate.lock().await.issue_code(phone).await
    }

    /// Verify the guest's code, persist the verified identity and resume any
    /// deferred submission.
    ///
    /// If the resumed submission fails it is parked again, so calling this once
    /// more for the verified phone retries it.
    pub async fn verify_guest(&self, phone: &str, code: &str) -> Result<Option<SubmitOutcome>> {
        let (pending, verified_phone) = {
            let mut gate = self.gate.lock().await;
            let pending = gate.verify_code(phone, code)?;
            (pending, gate.phone().map(str::to_string))
        };

        let Some(submission) = pending else {
            self.save_verified(verified_phone).await?;
            return Ok(None);
        };

        match self.resume(verified_phone, submission.clone()).await {
            Ok(outcome) => Ok(Some(outcome)),
            Err(e) => {
                warn!(error = %e, "Deferred submission failed, keeping it for a retry");
                self.gate.lock().await.defer(submission);
                Err(e)
            }
        }
    }

    async fn resume(&self, phone: Option<String>, submission: PendingSubmission) -> Result<SubmitOutcome> {
        let identity = self.save_verified(phone).await?;
        self.ensure_online("submit a request")?;
        debug!("Resuming deferred submission");
        self.submit_as(&identity, submission.form, submission.origin).await
    }

    /// Mark the stored identity verified for the phone the gate actually checked.
    async fn save_verified(&self, phone: Option<String>) -> Result<LocalIdentity> {
        let mut identity = self.identity().await?;
        identity.phone_verified = true;
        if phone.is_some() {
            identity.phone = phone;
        }
        self.engine.store().lock().await.store_identity(&identity)?;
        info!("Verified guest identity saved");
        Ok(identity)
    }

    pub async fn fulfill_request(&self, id: &CanonicalId) -> Result<()> {
        self.ensure_online("fulfil a request")?;
        self.ensure_pending(id).await?;
        self.directory().fulfill_request(id).await?;
        self.update_request(id, |request| request.fulfill()).await;
        info!(request_id = %id, "Request fulfilled");
        Ok(())
    }

    pub async fn reject_request(&self, id: &CanonicalId, reason: &str) -> Result<()> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(CoreError::Validation("a rejection reason is required".to_string()));
        }
        self.ensure_online("reject a request")?;
        self.ensure_pending(id).await?;
        self.directory().reject_request(id, reason).await?;
        self.update_request(id, |request| request.reject(reason)).await;
        info!(request_id = %id, reason, "Request rejected");
        Ok(())
    }

    async fn ensure_pending(&self, id: &CanonicalId) -> Result<()> {
        let requests = self.engine.state().requests.snapshot().await;
        match requests.iter().find(|r| &r.id == id) {
            Some(known) if known.is_terminal() => Err(CoreError::Validation(format!(
                "request {} is already {:?}",
                id, known.status
            ))),
            _ => Ok(()),
        }
    }

    async fn update_request(&self, id: &CanonicalId, change: impl FnOnce(&mut AidRequest) -> Result<()>) {
        let requests = &self.engine.state().requests;
        let result = self
            .engine
            .replace_local(ResourceKind::Requests, requests, |current| {
                let mut next = current.to_vec();
                if let Some(request) = next.iter_mut().find(|r| &r.id == id) {
                    if let Err(e) = change(request) {
                        debug!(error = %e, "Local request already terminal");
                    }
                }
                next
            })
            .await;
        if let Err(e) = result {
            warn!(request_id = %id, error = %e, "Could not cache request update");
        }
    }

    // =========================================================================
    // Centers
    // =========================================================================

    pub async fn set_center_status(&self, id: &CanonicalId, status: CenterStatus) -> Result<()> {
        self.patch_center(
            id,
            CenterPatch {
                status: Some(status),
                crowd: None,
            },
        )
        .await
    }

    pub async fn set_crowd_level(&self, id: &CanonicalId, crowd: CrowdLevel) -> Result<()> {
        self.patch_center(
            id,
            CenterPatch {
                status: None,
                crowd: Some(crowd),
            },
        )
        .await
    }

    async fn patch_center(&self, id: &CanonicalId, patch: CenterPatch) -> Result<()> {
        self.ensure_online("update a center")?;
        self.directory().patch_center(id, &patch).await?;

        let centers = &self.engine.state().centers;
        self.engine
            .replace_local(ResourceKind::Centers, centers, |current| {
                current
                    .iter()
                    .cloned()
                    .map(|mut center| {
                        if &center.id == id {
                            if let Some(status) = patch.status {
                                center.status = status;
                            }
                            if let Some(crowd) = patch.crowd {
                                center.crowd = crowd;
                            }
                        }
                        center
                    })
                    .collect()
            })
            .await?;
        info!(center_id = %id, ?patch, "Center updated");
        Ok(())
    }

    // =========================================================================
    // Hazards and alerts
    // =========================================================================

    /// Report a hazard zone. Returns the zone as the directory recorded it, when it says.
    pub async fn create_hazard_zone(
        &self,
        at: LatLng,
        radius_meters: Option<f64>,
        reason: &str,
    ) -> Result<Option<HazardZone>> {
        let radius = radius_meters.unwrap_or(DEFAULT_HAZARD_RADIUS_M);
        if !(radius.is_finite() && radius > 0.0) {
            return Err(CoreError::Validation("hazard radius must be positive".to_string()));
        }
        if !(at.lat.is_finite() && at.lng.is_finite()) {
            return Err(CoreError::MissingLocation);
        }
        self.ensure_online("report a hazard")?;

        let echo = self
            .directory()
            .create_hazard_zone(&NewHazardZone {
                lat: at.lat,
                lng: at.lng,
                radius,
                reason: reason.trim().to_string(),
            })
            .await?;
        info!(%at, radius, "Hazard zone reported");

        match HazardZone::decode(echo) {
            Ok(zone) => {
                let hazards = &self.engine.state().hazards;
                self.engine
                    .replace_local(ResourceKind::HazardZones, hazards, |current| {
                        upsert(current, zone.clone())
                    })
                    .await?;
                Ok(Some(zone))
            }
            Err(why) => {
                debug!(%why, "No usable echo, refreshing hazard zones");
                self.engine.tick(ResourceKind::HazardZones).await;
                Ok(None)
            }
        }
    }

    pub async fn delete_hazard_zone(&self, id: &CanonicalId) -> Result<()> {
        self.ensure_online("remove a hazard")?;
        self.directory().delete_hazard_zone(id).await?;

        let hazards = &self.engine.state().hazards;
        self.engine
            .replace_local(ResourceKind::HazardZones, hazards, |current| without(current, id))
            .await?;
        info!(zone_id = %id, "Hazard zone removed");
        Ok(())
    }

    pub async fn send_sos(
        &self,
        location: Option<LatLng>,
        reason: &str,
        sender: &LocalIdentity,
    ) -> Result<()> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(CoreError::Validation("describe the emergency".to_string()));
        }
        let at = location.ok_or(CoreError::MissingLocation)?;
        self.ensure_online("send an alert")?;

        let sender_type = serde_json::to_value(sender.role)?
            .as_str()
            .unwrap_or("consumer")
            .to_string();
        self.directory()
            .send_sos(&NewSosAlert {
                lat: at.lat,
                lng: at.lng,
                reason: reason.to_string(),
                sender_name: sender.name.clone(),
                sender_type,
            })
            .await?;
        warn!(%at, reason, "SOS alert sent");
        Ok(())
    }

    // =========================================================================
    // Routing
    // =========================================================================

    /// Plan a route against the current hazard set.
    pub async fn plan_route(&self, origin: Option<LatLng>, destination: Option<LatLng>) -> Result<RouteOutcome> {
        let hazards = self.engine.state().hazards.snapshot().await;
        self.planner.plan_route(origin, destination, &hazards).await
    }
}

fn validate_form(form: &RequestForm) -> Result<()> {
    if form.item_name.trim().is_empty() {
        return Err(CoreError::Validation("Please select a food item.".to_string()));
    }
    if !(form.quantity.is_finite() && form.quantity > 0.0) {
        return Err(CoreError::Validation("Please enter a valid quantity.".to_string()));
    }
    Ok(())
}
