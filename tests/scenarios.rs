use std::fs;
use std::thread;

use serde_json::json;
use shimmystache::{
    render, Config, FileLoader, FilterRegistry, InMemoryLoader, Record, RenderError, Signature,
    Param, Template, Value,
};

fn repos() -> Value {
    Value::from(json!({
        "email": "midbel@foobar.org",
        "repo": [
            { "Name": "curly", "Version": "0.0.1" },
            { "Name": "toml", "Version": "0.1.1" },
        ],
    }))
}

#[test]
fn repository_listing() {
    let template = "repositories:\n{{# repo -}}\n- {{Name}} (version: {{Version}})\n{{/ repo -}}\n\ncontact: {{email}}";
    assert_eq!(
        render(template, &repos()).unwrap(),
        "repositories:\n- curly (version: 0.0.1)\n- toml (version: 0.1.1)\ncontact: midbel@foobar.org"
    );
}

#[test]
fn repository_listing_reversed() {
    let template = "{{# repo | reverse }}{{Name}};{{/ repo }}";
    assert_eq!(render(template, &repos()).unwrap(), "toml;curly;");
}

#[test]
fn sections_with_and_without_override() {
    let template = concat!(
        "{{! comments are not rendered }}",
        "{{< contact -}}\ncontact: {{email | lower -}}\n{{/contact -}}\n",
        "{{% contact }}contact: noreply@foobar.org{{/ contact }}\n",
        "{{% licence }}licence: MIT{{/ licence}}",
    );
    assert_eq!(
        render(template, &repos()).unwrap(),
        "contact: midbel@foobar.org\nlicence: MIT"
    );
}

#[test]
fn override_defined_after_section() {
    assert_eq!(
        render("{{%x}}default{{/x}}{{<x}}override{{/x}}", &Value::Null).unwrap(),
        "override"
    );
}

#[test]
fn define_and_exec_with_narrowed_scope() {
    let template = concat!(
        "{{< list }}{{# character }}  {{loop}}/{{length}}: {{ name | title }}",
        "{{#role}}: {{role}}{{/role}}\n{{/ character }}{{/ list }}",
        "{{#movies}}[[{{title}}]]\n{{@ list character}}{{/movies}}",
    );
    let data = Value::from(json!({
        "movies": [
            {
                "title": "star wars: a new hope",
                "character": [
                    { "name": "luke skywalker", "role": "hero" },
                    { "name": "leia organa", "role": "hero" },
                    { "name": "anakin skywalker", "role": "" },
                ],
            },
            { "title": "star wars: the empire strikes back", "character": [] },
        ],
    }));
    assert_eq!(
        render(template, &data).unwrap(),
        concat!(
            "[[star wars: a new hope]]\n",
            "  1/3: Luke Skywalker: hero\n",
            "  2/3: Leia Organa: hero\n",
            "  3/3: Anakin Skywalker\n",
            "[[star wars: the empire strikes back]]\n",
        )
    );
}

#[test]
fn exec_with_undefined_key_fails() {
    let err = render("{{<x}}{{/x}}{{@ x nothing}}", &Value::Null).unwrap_err();
    assert!(err.to_string().contains("nothing"));
}

fn devs() -> Value {
    Value::from(json!({
        "devs": [
            {
                "Name": "rustine",
                "Repos": [
                    {
                        "Name": "data",
                        "Version": "1.0.0",
                        "Changes": [
                            { "Date": "2021-11-06 19:22:00", "Desc": "first major release" },
                        ],
                    },
                ],
            },
            {
                "Name": "midbel",
                "Repos": [
                    {
                        "Name": "fig",
                        "Version": "0.0.4",
                        "Changes": [
                            { "Date": "2021-11-06 19:22:00", "Desc": "restart from scratch" },
                            { "Date": "2021-06-06 15:45:00", "Desc": "initial commit" },
                        ],
                    },
                    {
                        "Name": "curly",
                        "Version": "0.1.0",
                        "Changes": [
                            { "Date": "2021-07-18 11:00:00", "Desc": "initial commit" },
                            { "Date": "2021-11-07 15:45:00", "Desc": "test parse files" },
                        ],
                    },
                ],
            },
        ],
    }))
}

const REPO_TXT: &str = "{{< repository -}}\n{{#Repos -}}\n- {{Name}} ({{Version}})\n{{@ changes Changes -}}\n{{/Repos -}}\n{{/ repository -}}";
const CHANGE_TXT: &str = "{{< changes -}}\n{{# Changes }}  - {{Date}}: {{Desc}}\n{{/ Changes -}}\n{{/ changes -}}";
const DEVS_EXPECTED: &str = concat!(
    "rustine\n",
    "- data (1.0.0)\n",
    "  - 2021-11-06 19:22:00: first major release\n",
    "midbel\n",
    "- fig (0.0.4)\n",
    "  - 2021-11-06 19:22:00: restart from scratch\n",
    "  - 2021-06-06 15:45:00: initial commit\n",
    "- curly (0.1.0)\n",
    "  - 2021-07-18 11:00:00: initial commit\n",
    "  - 2021-11-07 15:45:00: test parse files\n",
);

#[test]
fn definitions_from_partial_files() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("repo.txt"), REPO_TXT).unwrap();
    fs::write(dir.path().join("change.txt"), CHANGE_TXT).unwrap();

    let source = concat!(
        r#"{{> "repo.txt" }}{{> "change.txt" }}"#,
        "{{# devs }}{{Name}}\n{{@ repository Repos}}{{/ devs }}",
    );
    let loader = FileLoader::new(dir.path());
    let template = Template::parse_with(source, &loader, Config::default()).unwrap();
    let out = template
        .render(&devs(), &FilterRegistry::with_builtins())
        .unwrap();
    assert_eq!(out, DEVS_EXPECTED);
}

#[test]
fn definitions_from_merged_templates() {
    let mut main = Template::parse("{{# devs }}{{Name}}\n{{@ repository Repos}}{{/ devs }}").unwrap();
    for source in [REPO_TXT, CHANGE_TXT] {
        main.merge(&Template::parse(source).unwrap());
    }
    let out = main
        .render(&devs(), &FilterRegistry::with_builtins())
        .unwrap();
    assert_eq!(out, DEVS_EXPECTED);
}

#[test]
fn partial_defaults_can_be_overridden_by_the_page() {
    let loader = InMemoryLoader::new()
        .with("layout", "<title>{{%title}}Untitled{{/title}}</title>")
        .with("defs", "{{<title}}Home{{/title}}");

    let plain = Template::parse_with("{{> layout}}", &loader, Config::default()).unwrap();
    let with_defs =
        Template::parse_with("{{> defs}}{{> layout}}", &loader, Config::default()).unwrap();

    let filters = FilterRegistry::new();
    assert_eq!(plain.render(&Value::Null, &filters).unwrap(), "<title>Untitled</title>");
    assert_eq!(with_defs.render(&Value::Null, &filters).unwrap(), "<title>Home</title>");
}

#[test]
fn partial_renders_in_the_including_scope() {
    let loader = InMemoryLoader::new().with("item", "<li>{{ctx}}</li>");
    let template =
        Template::parse_with("{{#list}}{{> item}}{{/list}}", &loader, Config::default()).unwrap();
    let out = template
        .render(&Value::from(json!({ "list": ["a", "b"] })), &FilterRegistry::new())
        .unwrap();
    assert_eq!(out, "<li>a</li><li>b</li>");
}

#[test]
fn filter_chain() {
    assert_eq!(
        render(r#"{{ "under_score_text" | split "_" | reverse | join "/" }}"#, &Value::Null)
            .unwrap(),
        "text/under_score"
    );
}

#[test]
fn assignments() {
    assert_eq!(
        render(r#"{{:var "foobar" | upper}}{{var}}"#, &Value::Null).unwrap(),
        "FOOBAR"
    );
    assert_eq!(
        render("{{: var 4.1}}{{var | add 1}}", &Value::Null).unwrap(),
        "5.1"
    );
}

#[test]
fn assignment_is_local_to_its_block() {
    let out = render(
        "{{#list}}{{: last ctx}}{{last}}{{/list}}[{{last}}]",
        &Value::from(json!({ "list": ["a", "b"] })),
    )
    .unwrap();
    assert_eq!(out, "ab[]");
}

#[test]
fn custom_filters() {
    let mut filters = FilterRegistry::with_builtins();
    filters.register(
        "wrap",
        Signature::new(Param::String).param(Param::String),
        |value, args| {
            let text = value.as_str().unwrap_or_default();
            let with = args[0].as_str().unwrap_or_default();
            Ok(Value::from(format!("{with}{text}{with}")))
        },
    );
    let template = Template::parse("{{ name | wrap \"*\" | upper }}").unwrap();
    let ctx = Value::from(Record::new().tagged("Name", "name", "curly"));
    assert_eq!(template.render(&ctx, &filters).unwrap(), "*CURLY*");
}

#[test]
fn filter_errors_abort_assignments() {
    let err = render("{{: x 1 | div 0 }}", &Value::Null).unwrap_err();
    let shimmystache::Error::Render(RenderError::Filter { name, source }) = &err else {
        panic!("expected a filter error, got {err:?}");
    };
    assert_eq!(name, "div");
    assert_eq!(source.message(), "division by zero");
}

#[test]
fn rendering_is_deterministic() {
    let template = Template::parse("{{#repo}}{{loop}}:{{Name | upper}} {{/repo}}{{email}}").unwrap();
    let filters = FilterRegistry::with_builtins();
    let first = template.render(&repos(), &filters).unwrap();
    let second = template.render(&repos(), &filters).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, "1:CURLY 2:TOML midbel@foobar.org");
}

#[test]
fn concurrent_renders_share_one_template() {
    let template = Template::parse("{{#list}}{{ctx | mul 2}},{{/list}}").unwrap();
    let filters = FilterRegistry::with_builtins();

    let outputs: Vec<String> = thread::scope(|s| {
        let handles: Vec<_> = (0..4i64)
            .map(|n| {
                let template = &template;
                let filters = &filters;
                s.spawn(move || {
                    let ctx = Value::from(json!({ "list": [n, n + 1] }));
                    template.render(&ctx, filters).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(outputs, vec!["0,2,", "2,4,", "4,6,", "6,8,"]);
}

#[test]
fn render_to_any_writer() {
    let template = Template::parse("a{{b}}c").unwrap();
    let mut out = String::from(">");
    template
        .render_to(&mut out, &Value::from(json!({ "b": "-" })), &FilterRegistry::new())
        .unwrap();
    assert_eq!(out, ">a-c");
}

#[test]
fn recursive_definitions_are_bounded() {
    let template = Template::parse_with(
        "{{<r}}.{{@ r}}{{/r}}{{@ r}}",
        &shimmystache::NoLoader,
        Config::default().max_exec_depth(5),
    )
    .unwrap();
    let err = template
        .render(&Value::Null, &FilterRegistry::new())
        .unwrap_err();
    assert!(matches!(err, RenderError::RecursionLimit { limit: 5, .. }));
}
