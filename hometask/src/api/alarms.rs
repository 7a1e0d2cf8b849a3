use crate::services::alarm_store::AlarmStore;
use actix_web::{HttpResponse, Responder, get, web};
use std::sync::Arc;

/// Alarms currently held in the local store.
#[get("")]
pub async fn list_alarms(store: web::Data<Arc<dyn AlarmStore>>) -> impl Responder {
    match store.get_all() {
        Ok(mut alarms) => {
            alarms.sort_by_key(|alarm| alarm.start_time);
            HttpResponse::Ok().json(alarms)
        }
        Err(e) => {
            log::error!("Error reading alarms: {}", e);
            HttpResponse::InternalServerError().body("Error reading alarms")
        }
    }
}
