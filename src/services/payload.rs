//! 容器载荷模板
//!
//! 推理服务的源文件在本地渲染后经 SSH 写入远端暂存目录，
//! 模板在编译期校验，渲染只带三个变量：model_id / user_id / use_llama_cpp

use askama::Template;

use crate::domain::deploy::use_llama_cpp;

/// 暂存目录里的一个文件：相对路径 + 渲染后的内容
#[derive(Debug)]
pub struct PayloadFile {
    pub relative_path: &'static str,
    pub content: String,
}

#[derive(Template)]
#[template(path = "text_generation/Dockerfile.j2")]
struct DockerfileTemplate<'a> {
    model_id: &'a str,
    use_llama_cpp: bool,
}

#[derive(Template)]
#[template(path = "text_generation/requirements.j2")]
struct RequirementsTemplate {
    use_llama_cpp: bool,
}

#[derive(Template)]
#[template(path = "text_generation/app.py.j2")]
struct AppTemplate<'a> {
    model_id: &'a str,
    use_llama_cpp: bool,
}

#[derive(Template)]
#[template(path = "model_server/auth/middleware.py.j2")]
struct AuthMiddlewareTemplate;

#[derive(Template)]
#[template(path = "model_server/auth/token.py.j2")]
struct AuthTokenTemplate;

#[derive(Template)]
#[template(path = "model_server/auth/config.json.j2")]
struct AuthConfigTemplate<'a> {
    model_id: &'a str,
    user_id: &'a str,
}

#[derive(Template)]
#[template(path = "model_server/api/inference.py.j2")]
struct ApiInferenceTemplate<'a> {
    model_id: &'a str,
    use_llama_cpp: bool,
}

#[derive(Template)]
#[template(path = "model_server/api/token.py.j2")]
struct ApiTokenTemplate;

/// 渲染全部载荷文件
///
/// 返回的顺序即写入顺序：包导出的 `__init__.py` 在前，渲染文件在后
pub fn render_all(model_id: &str, user_id: &str) -> Result<Vec<PayloadFile>, askama::Error> {
    let llama = use_llama_cpp(model_id);

    let files = vec![
        PayloadFile {
            relative_path: "app/__init__.py",
            content: "from .app import app".to_string(),
        },
        PayloadFile {
            relative_path: "app/auth/__init__.py",
            content: String::new(),
        },
        PayloadFile {
            relative_path: "app/api/__init__.py",
            content: String::new(),
        },
        PayloadFile {
            relative_path: "Dockerfile",
            content: DockerfileTemplate {
                model_id,
                use_llama_cpp: llama,
            }
            .render()?,
        },
        PayloadFile {
            relative_path: "requirements.txt",
            content: RequirementsTemplate {
                use_llama_cpp: llama,
            }
            .render()?,
        },
        PayloadFile {
            relative_path: "app/app.py",
            content: AppTemplate {
                model_id,
                use_llama_cpp: llama,
            }
            .render()?,
        },
        PayloadFile {
            relative_path: "app/auth/middleware.py",
            content: AuthMiddlewareTemplate.render()?,
        },
        PayloadFile {
            relative_path: "app/auth/token.py",
            content: AuthTokenTemplate.render()?,
        },
        PayloadFile {
            relative_path: "app/auth/config.json",
            content: AuthConfigTemplate { model_id, user_id }.render()?,
        },
        PayloadFile {
            relative_path: "app/api/inference.py",
            content: ApiInferenceTemplate {
                model_id,
                use_llama_cpp: llama,
            }
            .render()?,
        },
        PayloadFile {
            relative_path: "app/api/token.py",
            content: ApiTokenTemplate.render()?,
        },
    ];

    Ok(files)
}
