use axum::{extract::State, Json};

use crate::{
    api::{
        auth::AdminUser,
        errors::{ApiQuery, AppError},
        AppState,
    },
    reports::{
        CommandReport, CommandReportParams, EnergyUsageReport, ReportParams, SensorStatsReport,
        WaterUsageReport,
    },
};

/// Command counts over a date range, grouped by device, status, user or day.
#[utoipa::path(
    get,
    path = "/api/reports/commands",
    params(CommandReportParams),
    responses(
        (status = 200, description = "Command report", body = CommandReport),
        (status = 400, description = "Invalid range or filter"),
        (status = 401, description = "Missing or invalid credentials"),
        (status = 403, description = "Caller is not an admin"),
    ),
    security(("bearer" = [])),
    tag = "reports"
)]
pub async fn command_report(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiQuery(params): ApiQuery<CommandReportParams>,
) -> Result<Json<CommandReport>, AppError> {
    Ok(Json(state.reports.commands(&params).await?))
}

#[utoipa::path(
    get,
    path = "/api/reports/water-usage",
    params(ReportParams),
    responses(
        (status = 200, description = "Daily water usage", body = WaterUsageReport),
        (status = 400, description = "Invalid or future range"),
        (status = 401, description = "Missing or invalid credentials"),
        (status = 403, description = "Caller is not an admin"),
    ),
    security(("bearer" = [])),
    tag = "reports"
)]
pub async fn water_usage(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiQuery(params): ApiQuery<ReportParams>,
) -> Result<Json<WaterUsageReport>, AppError> {
    Ok(Json(state.reports.water_usage(&params).await?))
}

/// Metered irrigation energy plus the flat daily draw of every active day.
#[utoipa::path(
    get,
    path = "/api/reports/energy-usage",
    params(ReportParams),
    responses(
        (status = 200, description = "Daily energy usage", body = EnergyUsageReport),
        (status = 400, description = "Invalid or future range"),
        (status = 401, description = "Missing or invalid credentials"),
        (status = 403, description = "Caller is not an admin"),
    ),
    security(("bearer" = [])),
    tag = "reports"
)]
pub async fn energy_usage(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiQuery(params): ApiQuery<ReportParams>,
) -> Result<Json<EnergyUsageReport>, AppError> {
    Ok(Json(state.reports.energy_usage(&params).await?))
}

#[utoipa::path(
    get,
    path = "/api/reports/sensor-stats",
    params(ReportParams),
    responses(
        (status = 200, description = "Daily sensor statistics", body = SensorStatsReport),
        (status = 400, description = "Invalid or future range"),
        (status = 401, description = "Missing or invalid credentials"),
        (status = 403, description = "Caller is not an admin"),
    ),
    security(("bearer" = [])),
    tag = "reports"
)]
pub async fn sensor_stats(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiQuery(params): ApiQuery<ReportParams>,
) -> Result<Json<SensorStatsReport>, AppError> {
    Ok(Json(state.reports.sensor_stats(&params).await?))
}

// Only paths that fail before touching the store are exercised here. The
// aggregations run against MySQL in tests/mysql_store.rs.
#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use chrono::{Duration, Utc};
    use serde_json::Value;

    use crate::{
        api::testing::{with_service_key, Harness, SERVICE_KEY},
        commands::{CommandStore, Device, SwitchState},
        reports::report_day,
        telemetry::{tests::sample_reading, NewResourceRecord, TelemetryStore},
        users::Role,
    };

    const ROUTES: [&str; 4] = [
        "/api/reports/commands",
        "/api/reports/water-usage",
        "/api/reports/energy-usage",
        "/api/reports/sensor-stats",
    ];

    #[tokio::test]
    async fn reports_are_admin_only() {
        let h = Harness::new();
        for route in ROUTES {
            h.server.get(route).await.assert_status(StatusCode::UNAUTHORIZED);
            h.as_user(h.server.get(route), Role::User)
                .await
                .assert_status(StatusCode::FORBIDDEN);
            with_service_key(h.server.get(route), SERVICE_KEY)
                .await
                .assert_status(StatusCode::FORBIDDEN);
        }
    }

    #[tokio::test]
    async fn missing_dates_are_400() {
        let h = Harness::new();
        for route in ROUTES {
            let resp = h.as_user(h.server.get(route), Role::Admin).await;
            resp.assert_status(StatusCode::BAD_REQUEST);
            assert_eq!(
                resp.json::<Value>()["error"],
                "startDate and endDate are required"
            );
        }
    }

    #[tokio::test]
    async fn malformed_and_inverted_ranges_are_400() {
        let h = Harness::new();
        for route in ROUTES {
            h.as_user(h.server.get(route), Role::Admin)
                .add_query_param("startDate", "2024/01/01")
                .add_query_param("endDate", "2024-01-02")
                .await
                .assert_status(StatusCode::BAD_REQUEST);
            h.as_user(h.server.get(route), Role::Admin)
                .add_query_param("startDate", "2024-01-05")
                .add_query_param("endDate", "2024-01-02")
                .await
                .assert_status(StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn future_end_date_is_400_for_resource_reports() {
        let h = Harness::new();
        let tomorrow = (report_day(Utc::now()) + Duration::days(1)).to_string();
        for route in &ROUTES[1..] {
            let resp = h
                .as_user(h.server.get(route), Role::Admin)
                .add_query_param("startDate", "2024-01-01")
                .add_query_param("endDate", &tomorrow)
                .await;
            resp.assert_status(StatusCode::BAD_REQUEST);
            assert!(resp.json::<Value>()["error"]
                .as_str()
                .unwrap()
                .contains("future"));
        }
    }

    #[tokio::test]
    async fn unknown_command_filters_are_400() {
        let h = Harness::new();
        for (key, value) in [("device", "heater"), ("status", "DONE"), ("groupBy", "week")] {
            h.as_user(h.server.get("/api/reports/commands"), Role::Admin)
                .add_query_param("startDate", "2024-01-01")
                .add_query_param("endDate", "2024-01-02")
                .add_query_param(key, value)
                .await
                .assert_status(StatusCode::BAD_REQUEST);
        }
    }

    fn at(s: &str) -> chrono::DateTime<Utc> {
        chrono::DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    async fn seed_batch(h: &Harness, resource_id: i64, timestamp: &str, liters: f64) {
        let timestamp = at(timestamp);
        let reading = crate::telemetry::NewSensorReading { timestamp, ..sample_reading() };
        let record = NewResourceRecord {
            resource_id,
            device_id: reading.device_id.clone(),
            timestamp,
            pump_runtime_sec: 120,
            valve_runtime_sec: 0,
            water_consumed_liters: liters,
            energy_consumed_kwh: 0.5,
            pump_state: true,
            valve_state: false,
        };
        h.telemetry.insert_batch(&reading, &[record]).await.unwrap();
    }

    #[tokio::test]
    async fn water_and_energy_reports_over_http() {
        let h = Harness::new();
        seed_batch(&h, 1, "2024-03-01T08:00:00Z", 4.0).await;
        // 16:00 UTC is already the next day in report time.
        seed_batch(&h, 2, "2024-03-01T16:00:00Z", 6.0).await;

        let water = h
            .as_user(h.server.get("/api/reports/water-usage"), Role::Admin)
            .add_query_param("startDate", "2024-03-01")
            .add_query_param("endDate", "2024-03-02")
            .await;
        water.assert_status_ok();
        let water = water.json::<Value>();
        assert_eq!(water["total_water_liters"], 10.0);
        assert_eq!(water["days"][0]["day"], "2024-03-01");
        assert_eq!(water["days"][1]["day"], "2024-03-02");
        assert_eq!(water["days"][1]["water_liters"], 6.0);

        let energy = h
            .as_user(h.server.get("/api/reports/energy-usage"), Role::Admin)
            .add_query_param("startDate", "2024-03-01")
            .add_query_param("endDate", "2024-03-01")
            .await;
        energy.assert_status_ok();
        let energy = energy.json::<Value>();
        assert_eq!(energy["active_days"], 1);
        assert_eq!(energy["total_irrigation_kwh"], 0.5);
        assert_eq!(energy["total_fixed_kwh"], 0.24);
        let total = energy["days"][0]["total_kwh"].as_f64().unwrap();
        assert!((total - 0.74).abs() < 1e-9);
    }

    #[tokio::test]
    async fn command_report_over_http() {
        let h = Harness::new();
        h.commands
            .insert(Device::Pump, SwitchState::On, 1, at("2024-03-01T02:00:00Z"))
            .await
            .unwrap();
        h.commands
            .insert(Device::Pump, SwitchState::Off, 1, at("2024-03-01T03:00:00Z"))
            .await
            .unwrap();
        h.commands
            .insert(Device::Valve, SwitchState::On, 1, at("2024-03-01T04:00:00Z"))
            .await
            .unwrap();

        let resp = h
            .as_user(h.server.get("/api/reports/commands"), Role::Admin)
            .add_query_param("startDate", "2024-03-01")
            .add_query_param("endDate", "2024-03-01")
            .await;
        resp.assert_status_ok();
        let body = resp.json::<Value>();
        assert_eq!(body["group_by"], "device");
        assert_eq!(body["groups"][0]["key"], "pump");
        assert_eq!(body["groups"][0]["pending"], 2);
        assert_eq!(body["groups"][1]["key"], "valve");
        assert_eq!(body["totals"]["total"], 3);
    }
}
