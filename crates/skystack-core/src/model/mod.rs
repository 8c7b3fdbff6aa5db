//! Typed configuration model.
//!
//! The model mirrors the YAML layout of a project: accounts and global
//! settings in `skystack.yaml`, one network environment per file under
//! `netenvs/`, one zone set per file under `dns/`. Every node knows how to
//! answer static attribute lookups for the reference resolver.

mod application;
mod dns;
mod netenv;
mod project;

// Re-exports
pub use application::*;
pub use dns::*;
pub use netenv::*;
pub use project::*;

pub(crate) use project::ProjectFile;

pub(crate) fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::Ref;
    use std::path::PathBuf;

    fn sample_project() -> Project {
        let netenv: NetworkEnvironment = serde_yaml::from_str(
            r#"
name: prod
account: prod
network:
  cidr: 10.0.0.0/16
  vpc:
    internet_gateway: true
  segments:
    - name: public
      cidr: 10.0.1.0/24
      public: true
    - name: private
      cidr: 10.0.2.0/24
applications:
  - name: web
    resources:
      - name: assets
        kind: bucket
        versioning: true
        change_protected: true
      - name: site
        kind: service
        segment: public
        instances: 2
"#,
        )
        .unwrap();

        let zone_set: ZoneSet = serde_yaml::from_str(
            r#"
name: public-zones
account: prod
zones:
  - name: example-com
    domain: example.com
    records:
      - name: www
        kind: cname
        value: "ref:netenv.prod.applications.web.resources.site.endpoint"
"#,
        )
        .unwrap();

        Project {
            root: PathBuf::new(),
            name: "sample".to_string(),
            state_dir: ".skystack".to_string(),
            accounts: vec![Account {
                name: "prod".to_string(),
                provider: "memory".to_string(),
                account_id: Some("123456789012".to_string()),
                default_region: "us-west-2".to_string(),
                enabled: true,
            }],
            netenvs: vec![netenv],
            zone_sets: vec![zone_set],
        }
    }

    #[test]
    fn test_yaml_defaults() {
        let project = sample_project();
        let netenv = project.netenv("prod").unwrap();
        assert!(netenv.enabled);
        assert!(netenv.network.vpc.enabled);
        assert!(netenv.network.vpc.internet_gateway);
        assert!(!netenv.segment("private").unwrap().public);

        let assets = netenv.application("web").unwrap().resource("assets").unwrap();
        assert!(assets.change_protected);
        assert!(assets.enabled);
    }

    #[test]
    fn test_resource_kind_tag() {
        let project = sample_project();
        let app = project.netenv("prod").unwrap().application("web").unwrap();
        assert!(matches!(
            app.resource("assets").unwrap().spec,
            ResourceSpec::Bucket(_)
        ));
        assert!(matches!(
            app.resource("site").unwrap().spec,
            ResourceSpec::Service(_)
        ));
    }

    #[test]
    fn test_static_get() {
        let project = sample_project();

        let cidr = project
            .get(&Ref::parse("ref:netenv.prod.network.cidr").unwrap())
            .unwrap();
        assert_eq!(cidr, serde_json::json!("10.0.0.0/16"));

        let segment_cidr = project
            .get(&Ref::parse("ref:netenv.prod.network.segments.public.cidr").unwrap())
            .unwrap();
        assert_eq!(segment_cidr, serde_json::json!("10.0.1.0/24"));

        let region = project
            .get(&Ref::parse("ref:accounts.prod.default_region").unwrap())
            .unwrap();
        assert_eq!(region, serde_json::json!("us-west-2"));

        let domain = project
            .get(&Ref::parse("ref:dns.public-zones.zones.example-com.domain").unwrap())
            .unwrap();
        assert_eq!(domain, serde_json::json!("example.com"));
    }

    #[test]
    fn test_static_get_misses_outputs() {
        let project = sample_project();
        // Output-style attributes are not configuration; the resolver treats
        // a miss here as "maybe a stack output".
        assert!(
            project
                .get(&Ref::parse("ref:netenv.prod.network.vpc.id").unwrap())
                .is_none()
        );
        assert!(
            project
                .get(&Ref::parse("ref:netenv.prod.network.segments.public.subnet_id").unwrap())
                .is_none()
        );
    }

    #[test]
    fn test_validate_duplicate_resource() {
        let mut project = sample_project();
        let app = &mut project.netenvs[0].applications[0];
        let mut dup = app.resources[0].clone();
        dup.name = "site".to_string();
        app.resources.push(dup);
        assert!(project.validate().is_err());
    }

    #[test]
    fn test_validate_unknown_account() {
        let mut project = sample_project();
        project.netenvs[0].account = "nope".to_string();
        assert!(matches!(
            project.validate(),
            Err(crate::error::CoreError::UnknownAccount(_))
        ));
    }

    #[test]
    fn test_validate_unknown_segment() {
        let mut project = sample_project();
        let app = &mut project.netenvs[0].applications[0];
        if let ResourceSpec::Service(service) = &mut app.resources[1].spec {
            service.segment = "missing".to_string();
        }
        assert!(project.validate().is_err());
    }

    #[test]
    fn test_region_for_falls_back_to_account() {
        let project = sample_project();
        let netenv = project.netenv("prod").unwrap();
        assert_eq!(project.region_for(netenv).unwrap(), "us-west-2");
    }
}
