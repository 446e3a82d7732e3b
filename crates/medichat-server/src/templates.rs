use axum::response::Html;
use minijinja::Environment;
use serde::Serialize;

/// Build the template environment from the files compiled into the binary.
pub fn environment() -> Result<Environment<'static>, minijinja::Error> {
    let mut env = Environment::new();
    env.add_template("base.html", include_str!("../templates/base.html"))?;
    env.add_template("chat.html", include_str!("../templates/chat.html"))?;
    Ok(env)
}

pub fn render_template<T>(
    templates: &Environment<'static>,
    template_name: &str,
    context: T,
) -> Result<Html<String>, minijinja::Error>
where
    T: Serialize,
{
    let tmpl = templates.get_template(template_name)?;
    let context = minijinja::Value::from_serialize(&context);
    let output = tmpl.render(context)?;

    Ok(output.into())
}
