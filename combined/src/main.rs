//! Demo binary - runs a small blog on the in-memory adapter and prints the
//! events the repositories publish.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use common::{AppResult, RepositoryConfig};
use domain::{AllAccess, Attributes, Filters};
use repository::{
    BelongsTo, ChannelPublisher, EventOptions, EventPublisher, FindOptions, HasMany,
    IndexOptions, JsonTextEncoder, MemoryAdapter, MemoryTable, RecordDescriptor, Repository,
    RepositorySettings,
};

#[derive(Parser)]
#[command(name = "repo-demo")]
#[command(about = "Event-emitting repository demo on in-memory storage")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create, publish and list posts, printing every event
    Run {
        /// Number of posts to create
        #[arg(long, default_value = "5")]
        posts: u64,
        /// Page size of the chunked listing
        #[arg(long, env = "REPOSITORY_CHUNK_SIZE")]
        chunk_size: Option<u64>,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = RepositoryConfig::from_env();

    let filter = if cli.verbose {
        "debug".to_string()
    } else {
        config.log_level.clone()
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Run { posts, chunk_size } => {
            let config = RepositoryConfig {
                chunk_size: chunk_size.unwrap_or(config.chunk_size),
                ..config
            };
            if let Err(e) = run(&config, posts).await {
                error!("Demo failed: {}", e);
                return Err(e.into());
            }
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

struct Blog {
    posts: Repository<MemoryAdapter>,
    comments: Repository<MemoryAdapter>,
}

fn attributes(value: Value) -> Attributes {
    match value {
        Value::Object(map) => map,
        _ => Attributes::new(),
    }
}

fn build_blog(config: &RepositoryConfig, publisher: Arc<dyn EventPublisher>) -> AppResult<Blog> {
    let users = Arc::new(MemoryTable::new("users"));
    let posts = Arc::new(MemoryTable::new("posts"));
    let comments = Arc::new(MemoryTable::new("comments"));

    users.insert(attributes(json!({"name": "Ada"})));
    users.insert(attributes(json!({"name": "Grace"})));

    let user_resource = format!("{}:user", config.service_name);
    let user = RecordDescriptor::new("user").build();
    let comment = RecordDescriptor::new("comment")
        .with_relation(
            "author",
            Arc::new(BelongsTo::new(
                users.clone(),
                user.clone(),
                user_resource.clone(),
                "author_id",
            )),
        )
        .build();
    let post = RecordDescriptor::new("post")
        .with_relation(
            "author",
            Arc::new(BelongsTo::new(users, user, user_resource, "author_id")),
        )
        .with_relation(
            "comments",
            Arc::new(HasMany::new(
                comments.clone(),
                comment.clone(),
                format!("{}:comment", config.service_name),
                "post_id",
            )),
        )
        .build();

    let post_settings = RepositorySettings::builder("posts")
        .config(config)
        .model(post)
        .encoder("tags", Arc::new(JsonTextEncoder))
        .event("publish", EventOptions::default())
        .build()?;
    let comment_settings = RepositorySettings::builder("comments")
        .config(config)
        .model(comment)
        .build()?;

    Ok(Blog {
        posts: Repository::new(
            MemoryAdapter::new(posts),
            post_settings,
            Arc::new(AllAccess),
            publisher.clone(),
        ),
        comments: Repository::new(
            MemoryAdapter::new(comments),
            comment_settings,
            Arc::new(AllAccess),
            publisher,
        ),
    })
}

async fn run(config: &RepositoryConfig, count: u64) -> AppResult<()> {
    let channel = Arc::new(ChannelPublisher::new(config.event_channel_capacity));
    let mut subscription = channel.subscribe("#");

    let listener = tokio::spawn(async move {
        while let Ok(publication) = subscription.recv().await {
            match serde_json::to_string(&publication.payload) {
                Ok(payload) => println!("event {} {}", publication.topic, payload),
                Err(e) => error!("Unprintable event {}: {}", publication.topic, e),
            }
        }
    });

    let publisher: Arc<dyn EventPublisher> = channel.clone();
    let blog = build_blog(config, publisher)?;

    info!(posts = count, service = %config.service_name, "Seeding blog");

    let metadata = attributes(json!({"source": "repo-demo"}));
    blog.posts
        .with_metadata(metadata, async {
            for n in 1..=count {
                let id = blog
                    .posts
                    .create(
                        attributes(json!({
                            "title": format!("Post {n}"),
                            "author_id": 1 + n % 2,
                            "tags": ["demo"],
                            "status": "draft",
                        })),
                        None,
                    )
                    .await?;

                blog.comments
                    .create(
                        attributes(json!({"post_id": id.to_value(), "author_id": 2, "body": "Nice"})),
                        None,
                    )
                    .await?;
            }
            AppResult::Ok(())
        })
        .await?;

    // a custom event that triggers a nested update
    let first = 1;
    blog.posts
        .call("publish", vec![json!(first)], async {
            blog.posts
                .update(first, attributes(json!({"status": "published"})), None)
                .await
        })
        .await?;

    let found = blog
        .posts
        .find_by_strict(
            &attributes(json!({"id": first})),
            FindOptions::new().include("author").include("comments.author"),
        )
        .await?;
    println!(
        "found {}",
        serde_json::to_string(&found).unwrap_or_else(|e| e.to_string())
    );

    let mut chunks = Box::pin(blog.posts.chunked_index(Filters::new(), IndexOptions::new().sort("-id")));
    while let Some(page) = chunks.next().await {
        let page = page?;
        let titles: Vec<&Value> = page.records.iter().filter_map(|r| r.get("title")).collect();
        println!("page {} {:?}", page.meta.page, titles);
    }
    drop(chunks);

    drop(blog);
    drop(channel);
    if let Err(e) = listener.await {
        error!("Event listener failed: {}", e);
    }

    Ok(())
}
