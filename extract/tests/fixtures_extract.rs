use std::fs;
use std::path::PathBuf;

use codearts_migrate_core::{Agent, PipelineModel, ProjectKind, StepKind};
use codearts_migrate_extract::{
    ApiExtractor, DslExtractor, ExtractOptions, Source, XmlExtractor, extract,
};

#[test]
fn test_jenkinsfile_fixture_extracts_stages_in_order() {
    let model = DslExtractor::default()
        .extract_file(fixture_path("Jenkinsfile"))
        .expect("fixture should be readable");

    let names: Vec<_> = model.stages.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["准备", "代码检查", "编译构建", "单元测试", "部署"]);
    assert_eq!(model.name, "pipeline");

    match &model.agent {
        Agent::Kubernetes { label, yaml } => {
            assert_eq!(label.as_deref(), Some("maven-jdk17"));
            assert!(yaml.as_deref().is_some_and(|y| y.contains("kind: Pod")));
        }
        other => panic!("unexpected agent {other:?}"),
    }
}

#[test]
fn test_jenkinsfile_fixture_parameters_and_environment() {
    let model = DslExtractor::default().extract(&fixture("Jenkinsfile"));

    assert_eq!(model.find_parameter("BRANCH_NAME").unwrap().value, "develop");
    assert_eq!(model.find_parameter("DEPLOY_ENV").unwrap().value, "dev");
    assert_eq!(model.find_parameter("SKIP_SONAR").unwrap().value, "false");

    assert_eq!(model.environment["APP_NAME"], "order-service");
    assert_eq!(
        model.environment["IMAGE_REPO"],
        "swr.cn-north-4.myhuaweicloud.com/shop/${APP_NAME}"
    );
    assert_eq!(model.environment["HARBOR"], "${credentials.harbor-robot}");
}

#[test]
fn test_jenkinsfile_fixture_steps() {
    let model = DslExtractor::default().extract(&fixture("Jenkinsfile"));

    let prepare = model.stage("准备").unwrap();
    assert_eq!(prepare.steps[0].kind, StepKind::Checkout);
    assert_eq!(prepare.steps[0].credentials.as_deref(), Some("codehub"));
    let scm = model.scm.as_ref().unwrap();
    assert_eq!(scm.url, "https://codehub.example.com/shop/order-service.git");
    assert_eq!(scm.branch, "develop");

    let check = model.stage("代码检查").unwrap();
    assert_eq!(check.steps.len(), 1);
    assert!(check.steps[0].command.starts_with("mvn -B sonar:sonar"));
    assert_eq!(
        check.when.as_deref(),
        Some("expression { return !params.SKIP_SONAR }")
    );

    let tests = model.stage("单元测试").unwrap();
    assert!(tests.parallel);
    assert_eq!(tests.steps.len(), 2);

    let deploy = model.stage("部署").unwrap();
    assert_eq!(deploy.when.as_deref(), Some("branch 'main'"));
    assert_eq!(deploy.environment["KUBECONFIG"], "${credentials.kubeconfig-prod}");
    assert_eq!(deploy.steps[0].kind, StepKind::Script);
    assert!(deploy.steps[0].command.contains("kubectl -n shop set image"));
}

#[test]
fn test_jenkinsfile_fixture_build_steps() {
    let model = DslExtractor::default().extract(&fixture("Jenkinsfile"));

    let kinds: Vec<_> = model.build_steps.iter().map(|s| s.kind).collect();
    assert_eq!(kinds, [StepKind::Maven, StepKind::Docker]);
    assert_eq!(model.build_steps[0].command, "mvn -B clean package -DskipTests");
    assert!(
        model
            .build_steps
            .iter()
            .all(|s| s.stage.as_deref() == Some("编译构建"))
    );
}

#[test]
fn test_config_xml_fixture() {
    let model = XmlExtractor::default()
        .extract_file(fixture_path("config.xml"))
        .expect("fixture should be readable");

    assert_eq!(model.kind, ProjectKind::Freestyle);
    assert_eq!(model.name, "fixtures");
    assert!(model.raw_xml.as_deref().is_some_and(|xml| xml.contains("<project>")));

    let scm = model.scm.as_ref().unwrap();
    assert_eq!(scm.url, "https://codehub.example.com/finance/billing-batch.git");
    assert_eq!(scm.branch, "release");

    let build = model.stage("Build").unwrap();
    assert_eq!(build.steps[0].kind, StepKind::Maven);
    assert_eq!(build.steps[0].command, "clean install -DskipTests=true");
    assert_eq!(build.steps[1].command, "echo \"preparing ${RELEASE}\"");

    let deploy = model.stage("Deploy").unwrap();
    assert_eq!(deploy.steps[0].kind, StepKind::Ssh);
    assert_eq!(deploy.steps[0].command, "cd /opt/billing && ./restart.sh");

    assert_eq!(model.find_parameter("RELEASE").unwrap().value, "v2.3.1");
    assert_eq!(model.find_parameter("NOTES").unwrap().value, "none");
}

#[test]
fn test_structure_fixture() {
    let model = ApiExtractor::default()
        .extract_file(fixture_path("structure.json"))
        .expect("fixture should parse");

    assert_eq!(model.name, "payment-gateway");
    assert_eq!(model.kind, ProjectKind::Pipeline);

    let kinds: Vec<_> = model
        .stages
        .iter()
        .map(|stage| stage.steps[0].kind)
        .collect();
    assert_eq!(kinds, [StepKind::Checkout, StepKind::Gradle, StepKind::Deploy]);
    assert_eq!(
        model.stage("Deploy").unwrap().steps[0].command,
        "helm upgrade --install payment ./chart -n payments"
    );

    assert_eq!(model.build_steps.len(), 1);
    assert_eq!(model.build_steps[0].kind, StepKind::Gradle);
    assert_eq!(model.find_parameter("TARGET_ENV").unwrap().value, "staging");
}

#[test]
fn test_single_stage_single_sh_across_sources() {
    let options = ExtractOptions::default();
    let models = [
        extract(
            Source::Jenkinsfile("pipeline { stages { stage('Build') { steps { sh 'make' } } } }"),
            &options,
        ),
        extract(
            Source::ConfigXml(
                "<project><builders><hudson.tasks.Shell><command>make</command></hudson.tasks.Shell></builders></project>",
            ),
            &options,
        ),
        extract(
            Source::Structure(serde_json::json!({
                "_class": "WorkflowJob",
                "stages": [{"name": "Build", "steps": [{"name": "Shell Script", "command": "make"}]}]
            })),
            &options,
        ),
    ];

    for model in models {
        let model = model.expect("extraction should succeed");
        let build = model.stage("Build").expect("Build stage");
        assert_eq!(build.steps[0].kind, StepKind::Sh);
        assert_eq!(build.steps[0].command, "make");
    }
}

fn parameter_names(model: &PipelineModel) -> Vec<&str> {
    model.parameters.iter().map(|p| p.name.as_str()).collect()
}

#[test]
fn test_parameter_names_unique_from_config_xml() {
    let options = ExtractOptions::default();
    let freestyle = extract(
        Source::ConfigXml(
            r#"<project><properties><hudson.model.ParametersDefinitionProperty><parameterDefinitions>
<hudson.model.StringParameterDefinition><name>GitBranch</name><defaultValue>main</defaultValue></hudson.model.StringParameterDefinition>
<hudson.model.ChoiceParameterDefinition><name>TARGET</name><choices><a><string>dev</string><string>prod</string></a></choices></hudson.model.ChoiceParameterDefinition>
<hudson.model.StringParameterDefinition><name>GitBranch</name><defaultValue>hotfix</defaultValue></hudson.model.StringParameterDefinition>
</parameterDefinitions></hudson.model.ParametersDefinitionProperty></properties></project>"#,
        ),
        &options,
    )
    .unwrap();
    assert_eq!(parameter_names(&freestyle), ["GitBranch", "TARGET"]);
    assert_eq!(freestyle.find_parameter("GitBranch").unwrap().value, "hotfix");

    let pipeline = extract(
        Source::ConfigXml(
            r#"<flow-definition>
  <properties><hudson.model.ParametersDefinitionProperty><parameterDefinitions>
    <hudson.model.StringParameterDefinition><name>GitBranch</name><defaultValue>main</defaultValue></hudson.model.StringParameterDefinition>
    <hudson.model.StringParameterDefinition><name>REGION</name><defaultValue>cn-north-4</defaultValue></hudson.model.StringParameterDefinition>
  </parameterDefinitions></hudson.model.ParametersDefinitionProperty></properties>
  <definition><script>pipeline {
    parameters { string(name: 'GitBranch', defaultValue: 'develop') }
    stages { stage('Build') { steps { sh 'make' } } }
  }</script></definition>
</flow-definition>"#,
        ),
        &options,
    )
    .unwrap();
    assert_eq!(parameter_names(&pipeline), ["GitBranch", "REGION"]);
    assert_eq!(pipeline.find_parameter("GitBranch").unwrap().value, "develop");
}

#[test]
fn test_parameter_names_unique_from_structure() {
    let model = extract(
        Source::Structure(serde_json::json!({
            "_class": "WorkflowJob",
            "parameters": [
                {"name": "GitBranch", "default": "main"},
                {"name": "AppName", "default": "shop"}
            ],
            "property": [{"parameterDefinitions": [
                {"name": "GitBranch", "defaultParameterValue": {"value": "release"}}
            ]}],
            "stages": [{"name": "Build", "steps": [{"command": "make"}]}]
        })),
        &ExtractOptions::default(),
    )
    .unwrap();
    assert_eq!(parameter_names(&model), ["GitBranch", "AppName"]);
    assert_eq!(model.find_parameter("GitBranch").unwrap().value, "release");
}

#[test]
fn test_structure_tolerates_null_and_missing_fields() {
    let model = ApiExtractor::default()
        .extract_value(serde_json::json!({
            "name": null,
            "_class": "org.jenkinsci.plugins.workflow.job.WorkflowJob",
            "parameters": [{"name": "A", "default": "x", "description": null}, {"name": null}],
            "property": [{"_class": null, "parameterDefinitions": null}],
            "stages": [
                {"name": "Build", "steps": [{"name": null, "command": "make"}]},
                {"name": "Idle", "steps": null},
                {"name": "Bare"}
            ]
        }))
        .expect("nulls should degrade to defaults");

    assert_eq!(model.name, "");
    assert_eq!(model.find_parameter("A").unwrap().description, "");
    let names: Vec<_> = model.stages.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["Build", "Idle", "Bare"]);
    assert_eq!(model.stages[0].steps[0].kind, StepKind::Sh);
    assert_eq!(model.stages[0].steps[0].command, "make");
    assert!(model.stages[1].steps.is_empty());
    assert!(model.stages[2].steps.is_empty());
}

#[test]
fn test_debug_json_keeps_stage_count_for_every_fixture() {
    let models = [
        DslExtractor::default().extract(&fixture("Jenkinsfile")),
        XmlExtractor::default().extract(&fixture("config.xml")),
        ApiExtractor::default()
            .extract_str(&fixture("structure.json"))
            .unwrap(),
    ];
    for model in models {
        let json = model.to_debug_json().unwrap();
        let back = PipelineModel::from_debug_json(&json).unwrap();
        assert_eq!(back.stages.len(), model.stages.len());
        assert!(back.raw_xml.is_none());
    }
}

#[test]
fn test_missing_file_is_io_error() {
    let result = DslExtractor::default().extract_file(fixture_path("does-not-exist"));
    assert!(matches!(
        result,
        Err(codearts_migrate_extract::ExtractError::IoError(_))
    ));
}

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn fixture(name: &str) -> String {
    fs::read_to_string(fixture_path(name)).expect("fixture file must be readable")
}
