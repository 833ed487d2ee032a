use opentelemetry::global;
use opentelemetry::metrics::Counter;

#[derive(Clone, Default)]
pub struct Metrics {
    pub location: LocationMetrics,
    pub attendance: AttendanceMetrics,
    pub geofences: GeofenceMetrics,
}

#[derive(Clone)]
pub struct LocationMetrics {
    pub recorded: Counter<u64>,
    pub outside: Counter<u64>,
}

#[derive(Clone)]
pub struct AttendanceMetrics {
    pub checkins: Counter<u64>,
    pub checkouts: Counter<u64>,
}

#[derive(Clone)]
pub struct GeofenceMetrics {
    pub created: Counter<u64>,
}

impl Default for LocationMetrics {
    fn default() -> Self {
        let meter = global::meter("tracking_api");
        let recorded = meter.u64_counter("location.samples.recorded").build();
        let outside = meter.u64_counter("location.samples.outside").build();

        Self { recorded, outside }
    }
}

impl Default for AttendanceMetrics {
    fn default() -> Self {
        let meter = global::meter("tracking_api");
        let checkins = meter.u64_counter("attendance.checkins").build();
        let checkouts = meter.u64_counter("attendance.checkouts").build();

        Self {
            checkins,
            checkouts,
        }
    }
}

impl Default for GeofenceMetrics {
    fn default() -> Self {
        let meter = global::meter("tracking_api");
        let created = meter.u64_counter("geofences.created").build();

        Self { created }
    }
}
