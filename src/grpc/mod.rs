mod eventing;

pub type NotificationStreamRequestAction = eventing::notification_stream_request::Action;
pub type StreamGroupDeliveryPolicy = eventing::create_stream_group_request::DeliveryPolicy;

pub use eventing::eventing_controller_server::{EventingController, EventingControllerServer};
pub use eventing::*;
