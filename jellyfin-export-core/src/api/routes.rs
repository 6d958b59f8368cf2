macro_rules! v1_path {
    ($path:literal) => {
        concat!("/api/v1", $path)
    };
}

/// Versioned API route definitions.
pub mod v1 {
    pub const ROOT: &str = "/api/v1";
    pub const VERSION: &str = "v1";

    pub mod method {
        /// `POST` with JSON keyword arguments; `{method}` is the dotted name.
        pub const CALL: &str = v1_path!("/method/{method}");
    }

    pub mod settings {
        pub const DOCUMENT: &str = v1_path!("/settings");
        pub const FORM: &str = v1_path!("/settings/form");
    }

    pub mod hooks {
        pub const DRIVE_ENTITY: &str = v1_path!("/hooks/drive-entity");
    }

    pub mod exports {
        pub const LIST: &str = v1_path!("/exports");
    }

    pub mod jobs {
        pub const OVERVIEW: &str = v1_path!("/jobs");
        pub const ITEM: &str = v1_path!("/jobs/{id}");
    }
}

/// Paths relative to [`v1::ROOT`], as the v1 router registers them.
pub fn relative(route: &'static str) -> &'static str {
    route.strip_prefix(v1::ROOT).unwrap_or(route)
}

pub mod utils {
    pub fn replace_param(
        route: &str,
        param: &str,
        value: impl AsRef<str>,
    ) -> String {
        route.replace(param, value.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_are_versioned() {
        assert_eq!(v1::settings::FORM, "/api/v1/settings/form");
        assert_eq!(relative(v1::jobs::ITEM), "/jobs/{id}");
        assert_eq!(
            utils::replace_param(
                v1::method::CALL,
                "{method}",
                "jellyfin_export.api.sync_all"
            ),
            "/api/v1/method/jellyfin_export.api.sync_all"
        );
    }
}
