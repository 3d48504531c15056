use serde::{Deserialize, Serialize};
use uuid::Uuid;

entity_id!(
    /// An order (shipment) placed by a customer.
    ShipmentId
);
entity_id!(
    /// One order detail (package) inside a shipment.
    PackageId
);
entity_id!(
    /// A vehicle assignment carrying one or more packages.
    TripId
);
entity_id!(VehicleId);
entity_id!(DriverId);
entity_id!(ReservationId);
entity_id!(OffRouteEventId);
entity_id!(IssueId);
entity_id!(AssessmentId);
