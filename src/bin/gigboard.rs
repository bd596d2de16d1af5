use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use log::debug;
use std::path::PathBuf;
use tokio::sync::mpsc::UnboundedReceiver;

use gigboard::prelude::*;

#[derive(Parser, Debug)]
#[clap(name = "gigboard", version)]
#[clap(about = "Freelance marketplace client", long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    /// Account email
    #[clap(long, env = "GIGBOARD_EMAIL", global = true)]
    email: Option<String>,

    /// Account password
    #[clap(long, env = "GIGBOARD_PASSWORD", global = true, hide_env_values = true)]
    password: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create an account with --email and --password
    Signup,
    /// List service categories
    Categories,
    /// List the subcategories of a category (name or id)
    Subcategories { category: String },
    /// Manage your service offers
    Services {
        #[clap(subcommand)]
        command: ServiceCommands,
    },
    /// Show or edit your profile
    Profile {
        #[clap(subcommand)]
        command: ProfileCommands,
    },
    /// Read or write posts
    Posts {
        #[clap(subcommand)]
        command: PostCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ServiceCommands {
    List,
    Add {
        #[clap(long)]
        category: String,
        #[clap(long)]
        subcategory: String,
        #[clap(long)]
        description: String,
        #[clap(long)]
        rate: String,
        #[clap(long, default_value = "USD")]
        currency: String,
    },
    /// Remove a service by id
    Remove { id: i64 },
}

#[derive(Subcommand, Debug)]
enum ProfileCommands {
    Show,
    Set {
        #[clap(long)]
        name: Option<String>,
        #[clap(long)]
        email: Option<String>,
        #[clap(long)]
        bio: Option<String>,
        /// Image file to upload as the profile picture
        #[clap(long)]
        avatar: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum PostCommands {
    List,
    Create {
        #[clap(long)]
        title: String,
        #[clap(long)]
        content: String,
        #[clap(long)]
        image_url: Option<String>,
    },
}

impl Commands {
    fn route(&self) -> Route {
        match self {
            Commands::Signup => Route::Signup,
            Commands::Categories | Commands::Subcategories { .. } => Route::Services,
            Commands::Services { .. } => Route::Services,
            Commands::Profile { .. } => Route::Profile,
            Commands::Posts { .. } => Route::Posts,
        }
    }
}

fn print_notices(notices: &mut UnboundedReceiver<Notice>) {
    while let Ok(notice) = notices.try_recv() {
        match notice.level {
            NoticeLevel::Success => println!("✓ {}", notice.message),
            NoticeLevel::Error => eprintln!("✗ {}", notice.message),
        }
    }
}

fn content_type_for(path: &std::path::Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

fn find_category<'a>(categories: &'a [Category], key: &str) -> Option<&'a Category> {
    match key.parse::<i64>() {
        Ok(id) => categories.iter().find(|c| c.id == id),
        Err(_) => categories.iter().find(|c| c.name.eq_ignore_ascii_case(key)),
    }
}

fn find_subcategory<'a>(subcategories: &'a [Subcategory], key: &str) -> Option<&'a Subcategory> {
    match key.parse::<i64>() {
        Ok(id) => subcategories.iter().find(|s| s.id == id),
        Err(_) => subcategories.iter().find(|s| s.name.eq_ignore_ascii_case(key)),
    }
}

/// `--email` without `--password` is rejected rather than silently ignored.
fn sign_in_credentials(cli: &Cli) -> anyhow::Result<Option<(&str, &str)>> {
    match (cli.email.as_deref(), cli.password.as_deref()) {
        (Some(email), Some(password)) => Ok(Some((email, password))),
        (Some(_), None) => bail!("--email needs --password (or GIGBOARD_PASSWORD)"),
        (None, _) => Ok(None),
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let app = Gigboard::from_env()?;
    debug!("using {} backend", app.config.backend);

    let (notifier, mut notices) = gigboard::notify::channel();

    if let Commands::Signup = cli.command {
        let (email, password) = cli
            .email
            .as_deref()
            .zip(cli.password.as_deref())
            .ok_or_else(|| anyhow!("signup needs --email and --password"))?;
        match app.auth.sign_up(email, password).await? {
            Some(identity) => println!("Signed up as {}", identity.id),
            None => println!("Check {} for a confirmation link", email),
        }
        return Ok(());
    }

    let (store, _writer) = app.session();
    let credentials = sign_in_credentials(&cli)?;
    if let Some((email, password)) = credentials {
        app.auth
            .sign_in(email, password)
            .await
            .map_err(|err| anyhow!(err.user_message()))?;
    }

    let route = cli.command.route();
    let mut route_guard = RouteGuard::new(store.clone());
    // サインイン直後のイベントが反映されるまで待つ
    let mut ready = store.clone();
    ready
        .wait_for(|state| !state.loading && (state.is_signed_in() || credentials.is_none()))
        .await;
    if let GuardDecision::Redirect(target) = route_guard.resolve(route).await {
        bail!("{} is not available here (go to {}); pass --email and --password", route, target);
    }
    let identity = app.require_identity()?;

    match cli.command {
        Commands::Signup => {}
        Commands::Categories => {
            let hook = CategoriesHook::mount(app.data.clone()).await;
            match hook.state() {
                FetchState::Ready(categories) => {
                    for category in categories {
                        println!("{:>4}  {}", category.id, category.name);
                    }
                }
                FetchState::Errored(message) => bail!(message),
                _ => {}
            }
        }
        Commands::Subcategories { category } => {
            let categories = CategoriesHook::mount(app.data.clone()).await.state();
            let selected = find_category(categories.items(), &category)
                .ok_or_else(|| anyhow!("unknown category: {}", category))?;

            let hook = SubcategoriesHook::mount(app.data.clone());
            hook.select_category(Some(selected.id)).await;
            if let Some(message) = hook.state().error() {
                bail!(message.to_string());
            }
            for subcategory in hook.state().items() {
                println!("{:>4}  {}", subcategory.id, subcategory.name);
            }
        }
        Commands::Services { command } => {
            let mut editor = ServiceEditor::new(app.data.clone(), notifier.clone(), &identity.id);
            match command {
                ServiceCommands::List => {
                    editor.load().await?;
                    for draft in editor.drafts() {
                        println!(
                            "{:>4}  {} / {}  {:.2} {}  {}",
                            draft.id.unwrap_or_default(),
                            draft.category_name.as_deref().unwrap_or("?"),
                            draft.subcategory_name.as_deref().unwrap_or("?"),
                            draft.rate,
                            draft.currency,
                            draft.description
                        );
                    }
                }
                ServiceCommands::Add {
                    category,
                    subcategory,
                    description,
                    rate,
                    currency,
                } => {
                    let categories = CategoriesHook::mount(app.data.clone()).await.state();
                    let category_id = find_category(categories.items(), &category).map(|c| c.id);
                    let subcategories = SubcategoriesHook::mount(app.data.clone());
                    subcategories.select_category(category_id).await;
                    let subcategories = subcategories.state();
                    let subcategory_id =
                        find_subcategory(subcategories.items(), &subcategory).map(|s| s.id);

                    let form = ServiceForm {
                        category_id,
                        subcategory_id,
                        description,
                        rate,
                        currency,
                    };
                    let result = editor
                        .submit(&form, categories.items(), subcategories.items())
                        .await
                        .map(|draft| draft.id);
                    print_notices(&mut notices);
                    if let Some(id) = result? {
                        println!("Created service {}", id);
                    }
                }
                ServiceCommands::Remove { id } => {
                    editor.load().await?;
                    let index = editor
                        .drafts()
                        .iter()
                        .position(|draft| draft.id == Some(id))
                        .ok_or_else(|| anyhow!("no service {}", id))?;
                    editor.remove(index).await?;
                }
            }
        }
        Commands::Profile { command } => {
            let editor = ProfileEditor::new(
                app.data.clone(),
                app.files.clone(),
                app.auth.clone(),
                notifier.clone(),
                identity.clone(),
            );
            let mut form = editor.load().await?;
            match command {
                ProfileCommands::Show => {
                    println!("name:   {}", form.name);
                    println!("email:  {}", form.email);
                    println!("bio:    {}", form.bio);
                    println!("avatar: {}", form.avatar_url.as_deref().unwrap_or("-"));
                }
                ProfileCommands::Set {
                    name,
                    email,
                    bio,
                    avatar,
                } => {
                    if let Some(name) = name {
                        form.name = name;
                    }
                    if let Some(email) = email {
                        form.email = email;
                    }
                    if let Some(bio) = bio {
                        form.bio = bio;
                    }
                    if let Some(path) = avatar {
                        let bytes = tokio::fs::read(&path)
                            .await
                            .with_context(|| format!("reading {}", path.display()))?;
                        let file_name = path
                            .file_name()
                            .and_then(|name| name.to_str())
                            .ok_or_else(|| anyhow!("invalid file name: {}", path.display()))?;
                        editor
                            .upload_avatar(&mut form, file_name, bytes, content_type_for(&path))
                            .await?;
                    }
                    editor.save(&form).await?;
                }
            }
        }
        Commands::Posts { command } => match command {
            PostCommands::List => {
                for post in app.data.list_posts().await? {
                    let author = post
                        .author
                        .as_ref()
                        .and_then(|author| author.name.as_deref())
                        .unwrap_or("anonymous");
                    println!("#{} {} ({})", post.id, post.title, author);
                    println!("    {}", post.content);
                }
            }
            PostCommands::Create {
                title,
                content,
                image_url,
            } => {
                let post = app
                    .data
                    .create_post(&NewPost {
                        title,
                        content,
                        user_id: identity.id.clone(),
                        image_url,
                    })
                    .await?;
                notifier.success(format!("Post #{} published", post.id));
            }
        },
    }

    print_notices(&mut notices);
    Ok(())
}

#[tokio::main]
async fn main() {
    pretty_env_logger::init();

    if let Err(err) = run().await {
        eprintln!("error: {:#}", err);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(email: Option<&str>, password: Option<&str>) -> Cli {
        Cli {
            command: Commands::Categories,
            email: email.map(str::to_string),
            password: password.map(str::to_string),
        }
    }

    #[test]
    fn test_email_without_password_is_rejected() {
        assert!(sign_in_credentials(&cli(Some("a@example.com"), None)).is_err());
    }

    #[test]
    fn test_credentials() {
        let both = cli(Some("a@example.com"), Some("secret"));
        assert_eq!(
            sign_in_credentials(&both).unwrap(),
            Some(("a@example.com", "secret"))
        );
        assert_eq!(sign_in_credentials(&cli(None, Some("secret"))).unwrap(), None);
    }
}
