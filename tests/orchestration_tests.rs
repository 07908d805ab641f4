//! Launch orchestration tests against the mock provider

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use cloud_launch_rs::provider::mock::{generated_node, MockProvider, ProviderCall};
use cloud_launch_rs::provider::{AddressKind, ComputeProvider, NodeMetadata, SSH_PORT};
use cloud_launch_rs::script::{ScriptFragment, RUNURL_CHMOD, RUNURL_FETCH};
use cloud_launch_rs::service::{hadoop, zookeeper, HadoopService, ZooKeeperService};
use cloud_launch_rs::spec::FailurePolicy;
use cloud_launch_rs::{
    destroy_cluster, launch_cluster, ClusterService, ClusterSpec, LaunchConfig, LaunchError,
    ServiceSpec,
};

/// Temp dir holding a fake key pair
struct Keys {
    dir: TempDir,
}

impl Keys {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("id_rsa"), "-----PRIVATE KEY-----\n").unwrap();
        std::fs::write(dir.path().join("id_rsa.pub"), "ssh-rsa AAAA test@host\n").unwrap();
        Self { dir }
    }

    fn spec(&self, service: &str, cluster: &str) -> ServiceSpec {
        let mut spec = ServiceSpec::new(service, cluster, "ec2");
        spec.private_key_file = Some(self.dir.path().join("id_rsa"));
        spec
    }
}

fn hadoop_with(mock: &Arc<MockProvider>, spec: ServiceSpec) -> HadoopService {
    HadoopService::new(spec, mock.clone())
}

fn launches(calls: &[ProviderCall]) -> Vec<(usize, String)> {
    calls
        .iter()
        .filter_map(|call| match call {
            ProviderCall::Launch {
                count, template, ..
            } => Some((*count, template.boot_script.to_string())),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_hadoop_launches_master_then_workers() {
    let keys = Keys::new();
    let mock = Arc::new(MockProvider::new());
    let service = hadoop_with(&mock, keys.spec("hadoop", "analytics"));

    let spec: ClusterSpec = "1 nn+jt,3 dn+tt".parse().unwrap();
    let cluster = service.launch_cluster(&spec).await.unwrap();

    let calls = mock.calls();
    assert_eq!(calls.len(), 2);
    let launches = launches(&calls);
    assert_eq!(launches[0].0, 1);
    assert!(launches[0].1.contains("apache/hadoop/install nn,jt -c ec2"));
    assert_eq!(launches[1].0, 3);
    assert!(launches[1]
        .1
        .contains("apache/hadoop/install dn,tt -n 198.51.100.1 -j 198.51.100.1"));

    assert_eq!(cluster.instances().len(), 4);
    assert_eq!(cluster.instances_in_role("nn").count(), 1);
    assert_eq!(cluster.instances_in_role("tt").count(), 3);
    assert_eq!(cluster.get("fs.default.name"), Some("hdfs://198.51.100.1:8020/"));
    assert_eq!(cluster.get("mapred.job.tracker"), Some("198.51.100.1:8021"));
    assert_eq!(cluster.get("hadoop.job.ugi"), Some("root,root"));
}

#[tokio::test]
async fn test_hadoop_templates_carry_keys_and_ports() {
    let keys = Keys::new();
    let mock = Arc::new(MockProvider::new());
    let service = hadoop_with(&mock, keys.spec("hadoop", "analytics"));

    service
        .launch_cluster(&"1 nn+jt,2 dn+tt".parse().unwrap())
        .await
        .unwrap();

    let templates = mock.launched_templates();
    assert_eq!(templates.len(), 2);
    assert_eq!(templates[0].private_key, "-----PRIVATE KEY-----\n");
    assert_eq!(templates[0].public_key, "ssh-rsa AAAA test@host\n");
    for port in [SSH_PORT, 80, 8020, 8021, 50030] {
        assert!(templates[0].inbound_ports.contains(&port), "port {}", port);
    }
    assert_eq!(templates[1].inbound_ports, vec![SSH_PORT]);
}

#[tokio::test]
async fn test_hadoop_rejects_multiple_masters_before_provider_call() {
    let keys = Keys::new();
    let mock = Arc::new(MockProvider::new());
    let service = hadoop_with(&mock, keys.spec("hadoop", "analytics"));

    let err = service
        .launch_cluster(&"2 nn+jt,3 dn+tt".parse().unwrap())
        .await
        .unwrap_err();

    assert!(err.is_config());
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn test_hadoop_missing_key_fails_before_provider_call() {
    let mock = Arc::new(MockProvider::new());
    let mut spec = ServiceSpec::new("hadoop", "analytics", "ec2");
    spec.private_key_file = Some("/nonexistent/id_rsa".into());
    let service = hadoop_with(&mock, spec);

    let err = service
        .launch_cluster(&"1 nn+jt,1 dn+tt".parse().unwrap())
        .await
        .unwrap_err();

    assert!(err.is_config());
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn test_hadoop_workers_can_use_private_master_address() {
    let keys = Keys::new();
    let mock = Arc::new(MockProvider::new());
    let mut spec = keys.spec("hadoop", "analytics");
    spec.master_address = AddressKind::Private;
    let service = hadoop_with(&mock, spec);

    let cluster = service
        .launch_cluster(&"1 nn+jt,1 dn+tt".parse().unwrap())
        .await
        .unwrap();

    let templates = mock.launched_templates();
    assert!(templates[1]
        .boot_script
        .as_str()
        .contains("dn,tt -n 10.0.0.1 -j 10.0.0.1"));
    // Client configuration always points at the public address
    assert_eq!(cluster.get("mapred.job.tracker"), Some("198.51.100.1:8021"));
}

#[tokio::test]
async fn test_hadoop_hooks_reach_both_scripts() {
    let keys = Keys::new();
    let mock = Arc::new(MockProvider::new());
    let mut service = hadoop_with(&mock, keys.spec("hadoop", "analytics"));
    service
        .registry_mut()
        .add_one("AFTER_HADOOP", ScriptFragment::new("extra/tune-hdfs").arg("-x"));

    service
        .launch_cluster(&"1 nn+jt,1 dn+tt".parse().unwrap())
        .await
        .unwrap();

    for template in mock.launched_templates() {
        let statements = template.boot_script.statements();
        assert_eq!(statements[0], RUNURL_FETCH);
        assert_eq!(statements[1], RUNURL_CHMOD);
        assert_eq!(
            statements.last().copied(),
            Some("runurl cloudera-tom.s3.amazonaws.com/extra/tune-hdfs -x")
        );
    }
}

/// Zero workers still goes through the worker phase
#[tokio::test]
async fn test_hadoop_single_node_cluster() {
    let keys = Keys::new();
    let mock = Arc::new(MockProvider::new());
    let service = hadoop_with(&mock, keys.spec("hadoop", "tiny"));

    let cluster = service
        .launch_cluster(&"1 nn+jt,0 dn+tt".parse().unwrap())
        .await
        .unwrap();

    assert_eq!(cluster.instances().len(), 1);
    assert_eq!(launches(&mock.calls())[1].0, 0);
}

#[tokio::test]
async fn test_hadoop_worker_failure_leaves_master_running() {
    let keys = Keys::new();
    let mock = Arc::new(MockProvider::new().with_launch_error(2, "insufficient capacity"));
    let service = hadoop_with(&mock, keys.spec("hadoop", "analytics"));

    let err = service
        .launch_cluster(&"1 nn+jt,3 dn+tt".parse().unwrap())
        .await
        .unwrap_err();

    match err {
        LaunchError::Provisioning { phase, message } => {
            assert_eq!(phase, "worker");
            assert!(message.contains("insufficient capacity"));
        }
        other => panic!("unexpected error: {}", other),
    }
    let calls = mock.calls();
    assert_eq!(calls.len(), 2);
    assert!(!calls
        .iter()
        .any(|call| matches!(call, ProviderCall::Destroy { .. })));
}

#[tokio::test]
async fn test_hadoop_master_failure_skips_workers() {
    let keys = Keys::new();
    let mock = Arc::new(MockProvider::new().with_launch_error(1, "bad image"));
    let service = hadoop_with(&mock, keys.spec("hadoop", "analytics"));

    let err = service
        .launch_cluster(&"1 nn+jt,3 dn+tt".parse().unwrap())
        .await
        .unwrap_err();

    assert!(matches!(err, LaunchError::Provisioning { ref phase, .. } if phase == "master"));
    assert_eq!(mock.calls().len(), 1);
}

#[tokio::test]
async fn test_hadoop_destroy_cluster_policy() {
    let keys = Keys::new();
    let mock = Arc::new(MockProvider::new().with_launch_error(2, "insufficient capacity"));
    let mut spec = keys.spec("hadoop", "analytics");
    spec.failure_policy = FailurePolicy::DestroyCluster;
    let service = hadoop_with(&mock, spec);

    let err = service
        .launch_cluster(&"1 nn+jt,3 dn+tt".parse().unwrap())
        .await
        .unwrap_err();

    assert!(matches!(err, LaunchError::Provisioning { .. }));
    assert_eq!(
        mock.calls().last(),
        Some(&ProviderCall::Destroy {
            tag: "analytics".into()
        })
    );
}

#[tokio::test]
async fn test_hadoop_failed_teardown_keeps_original_error() {
    let keys = Keys::new();
    let mock = Arc::new(
        MockProvider::new()
            .with_launch_error(2, "insufficient capacity")
            .with_destroy_error("api down"),
    );
    let mut spec = keys.spec("hadoop", "analytics");
    spec.failure_policy = FailurePolicy::DestroyCluster;
    let service = hadoop_with(&mock, spec);

    let err = service
        .launch_cluster(&"1 nn+jt,3 dn+tt".parse().unwrap())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("insufficient capacity"));
}

#[tokio::test]
async fn test_hadoop_master_count_mismatch_from_provider() {
    let keys = Keys::new();
    let mock = Arc::new(MockProvider::new().with_launch_response(vec![]));
    let service = hadoop_with(&mock, keys.spec("hadoop", "analytics"));

    let err = service
        .launch_cluster(&"1 nn+jt,1 dn+tt".parse().unwrap())
        .await
        .unwrap_err();

    assert!(matches!(err, LaunchError::Provider(_)));
    assert_eq!(mock.calls().len(), 1);
}

#[tokio::test]
async fn test_provider_deadline() {
    let keys = Keys::new();
    let mock = Arc::new(MockProvider::new().with_launch_delay(Duration::from_secs(30)));
    let mut spec = keys.spec("hadoop", "slow");
    spec.provider_timeout_ms = Some(20);
    let service = hadoop_with(&mock, spec);

    let err = service
        .launch_cluster(&"1 nn+jt,1 dn+tt".parse().unwrap())
        .await
        .unwrap_err();

    assert!(matches!(err, LaunchError::Timeout { millis: 20, .. }));
}

#[tokio::test]
async fn test_hadoop_writes_client_site() {
    let keys = Keys::new();
    let out = TempDir::new().unwrap();
    let site = out.path().join("conf").join("hadoop-site.xml");

    let mock = Arc::new(MockProvider::new());
    let mut spec = keys.spec("hadoop", "analytics");
    spec.client_site_file = Some(site.clone());
    let service = hadoop_with(&mock, spec);

    service
        .launch_cluster(&"1 nn+jt,1 dn+tt".parse().unwrap())
        .await
        .unwrap();

    let xml = std::fs::read_to_string(&site).unwrap();
    assert!(xml.starts_with("<?xml version=\"1.0\"?>"));
    assert!(xml.contains("<name>fs.default.name</name>"));
    assert!(xml.contains("<value>hdfs://198.51.100.1:8020/</value>"));
}

/// A client-site path that cannot be created does not undo a running cluster
#[tokio::test]
async fn test_hadoop_unwritable_client_site_keeps_cluster() {
    let keys = Keys::new();
    let out = TempDir::new().unwrap();
    let blocker = out.path().join("blocker");
    std::fs::write(&blocker, "not a directory").unwrap();

    let mock = Arc::new(MockProvider::new());
    let mut spec = keys.spec("hadoop", "analytics");
    spec.client_site_file = Some(blocker.join("hadoop-site.xml"));
    spec.failure_policy = FailurePolicy::DestroyCluster;
    let service = hadoop_with(&mock, spec);

    let cluster = service
        .launch_cluster(&"1 nn+jt,2 dn+tt".parse().unwrap())
        .await
        .unwrap();

    assert_eq!(cluster.instances().len(), 3);
    let calls = mock.calls();
    assert_eq!(calls.len(), 2);
    assert!(!calls
        .iter()
        .any(|call| matches!(call, ProviderCall::Destroy { .. })));
}

#[tokio::test]
async fn test_zookeeper_ensemble() {
    let keys = Keys::new();
    let mock = Arc::new(MockProvider::new());
    let service = ZooKeeperService::new(keys.spec("zookeeper", "coord"), mock.clone());

    let cluster = service
        .launch_cluster(&"3 zk".parse().unwrap())
        .await
        .unwrap();

    let calls = mock.calls();
    assert_eq!(calls.len(), 2);
    match &calls[0] {
        ProviderCall::Launch {
            tag,
            count,
            template,
        } => {
            assert_eq!(tag, "coord");
            assert_eq!(*count, 3);
            assert!(template.inbound_ports.contains(&zookeeper::CLIENT_PORT));
            assert!(template
                .boot_script
                .as_str()
                .contains("runurl cloudera-tom.s3.amazonaws.com/apache/zookeeper/install\n"));
        }
        other => panic!("expected launch, got {:?}", other),
    }
    match &calls[1] {
        ProviderCall::RunScript { tag, script } => {
            assert_eq!(tag, "coord");
            assert_eq!(
                script.statements()[2],
                "runurl cloudera-tom.s3.amazonaws.com/apache/zookeeper/post-configure 10.0.0.1 10.0.0.2 10.0.0.3"
            );
        }
        other => panic!("expected run-script, got {:?}", other),
    }

    assert_eq!(cluster.instances().len(), 3);
    assert_eq!(
        cluster.zookeeper_hosts(),
        Some("198.51.100.1:2181,198.51.100.2:2181,198.51.100.3:2181")
    );
}

#[tokio::test]
async fn test_zookeeper_peers_follow_provider_order() {
    let keys = Keys::new();
    let nodes: Vec<NodeMetadata> = [7, 3].iter().map(|n| generated_node("coord", *n)).collect();
    let mock = Arc::new(MockProvider::new().with_launch_response(nodes));
    let service = ZooKeeperService::new(keys.spec("zookeeper", "coord"), mock.clone());

    let cluster = service
        .launch_cluster(&"2 zk".parse().unwrap())
        .await
        .unwrap();

    match &mock.calls()[1] {
        ProviderCall::RunScript { script, .. } => {
            assert!(script.as_str().contains("post-configure 10.0.0.7 10.0.0.3\n"));
        }
        other => panic!("expected run-script, got {:?}", other),
    }
    assert_eq!(
        cluster.zookeeper_hosts(),
        Some("198.51.100.7:2181,198.51.100.3:2181")
    );
}

#[tokio::test]
async fn test_zookeeper_configure_failure() {
    let keys = Keys::new();
    let mock = Arc::new(MockProvider::new().with_run_script_error("ssh refused"));
    let service = ZooKeeperService::new(keys.spec("zookeeper", "coord"), mock.clone());

    let err = service
        .launch_cluster(&"3 zk".parse().unwrap())
        .await
        .unwrap_err();

    assert!(matches!(err, LaunchError::Configure(_)));
    assert_eq!(mock.calls().len(), 2);
}

#[tokio::test]
async fn test_destroy_uses_cluster_tag() {
    let mock = Arc::new(MockProvider::new());
    let service =
        ZooKeeperService::new(ServiceSpec::new("zookeeper", "coord", "ec2"), mock.clone());

    service.destroy_cluster().await.unwrap();
    assert_eq!(mock.calls(), vec![ProviderCall::Destroy { tag: "coord".into() }]);
}

#[tokio::test]
async fn test_launch_from_config_with_hooks() {
    let keys = Keys::new();
    let yaml = format!(
        r#"
service:
  service_name: hadoop
  cluster_name: analytics
  provider: ec2
  private_key_file: {}
  script_base_url: http://mirror.internal/scripts
cluster: "1 nn+jt,2 dn+tt"
hooks:
  BEFORE_JAVA:
    - path: extra/apt-update
"#,
        keys.dir.path().join("id_rsa").display()
    );
    let config = LaunchConfig::from_yaml(&yaml).unwrap();
    let mock = Arc::new(MockProvider::new());
    let provider: Arc<dyn ComputeProvider> = mock.clone();

    let cluster = launch_cluster(&config, provider.clone()).await.unwrap();
    assert_eq!(cluster.instances().len(), 3);

    let master = &mock.launched_templates()[0];
    assert_eq!(
        master.boot_script.statements()[2..4],
        [
            "runurl cloudera-tom.s3.amazonaws.com/extra/apt-update",
            "runurl http://mirror.internal/scripts/sun/java/install",
        ]
    );

    destroy_cluster(&config, provider).await.unwrap();
    assert_eq!(
        mock.calls().last(),
        Some(&ProviderCall::Destroy {
            tag: "analytics".into()
        })
    );
}

#[test]
fn test_rendered_scripts_match_service_scripts() {
    let config = LaunchConfig::from_yaml(
        r#"
service:
  service_name: hadoop
  cluster_name: analytics
  provider: ec2
cluster: "1 nn+jt,2 dn+tt"
"#,
    )
    .unwrap();
    let steps = cloud_launch_rs::script::InstallSteps::new(None);
    let registry = config.registry();

    let service = HadoopService::new(config.service.clone(), Arc::new(MockProvider::new()));
    assert_eq!(
        hadoop::master_boot_script(&registry, &steps, "ec2"),
        service.master_boot_script()
    );
    assert_eq!(
        hadoop::worker_boot_script(&registry, &steps, "m"),
        service.worker_boot_script("m")
    );
}

#[test]
fn test_worker_script_without_hooks() {
    let steps = cloud_launch_rs::script::InstallSteps::default();
    let registry = cloud_launch_rs::script::ScriptRegistry::new();

    let script = hadoop::worker_boot_script(&registry, &steps, "10.0.0.1");
    assert_eq!(
        script.statements(),
        vec![
            RUNURL_FETCH,
            RUNURL_CHMOD,
            "runurl cloudera-tom.s3.amazonaws.com/sun/java/install",
            "runurl cloudera-tom.s3.amazonaws.com/apache/hadoop/install dn,tt -n 10.0.0.1 -j 10.0.0.1",
        ]
    );
}

#[test]
fn test_master_script_with_before_java_and_default_hooks() {
    use cloud_launch_rs::script::registry::{BEFORE_JAVA, DEFAULT_LABEL};

    let steps = cloud_launch_rs::script::InstallSteps::default();
    let mut registry = cloud_launch_rs::script::ScriptRegistry::new();
    registry.add_one(BEFORE_JAVA, ScriptFragment::new("extra/apt-update"));
    registry.add_one(DEFAULT_LABEL, ScriptFragment::new("extra/motd").arg("ready"));

    let script = hadoop::master_boot_script(&registry, &steps, "ec2");
    assert_eq!(
        script.statements(),
        vec![
            RUNURL_FETCH,
            RUNURL_CHMOD,
            "runurl cloudera-tom.s3.amazonaws.com/extra/apt-update",
            "runurl cloudera-tom.s3.amazonaws.com/sun/java/install",
            "runurl cloudera-tom.s3.amazonaws.com/apache/hadoop/install nn,jt -c ec2",
            "runurl cloudera-tom.s3.amazonaws.com/extra/motd ready",
        ]
    );
}
