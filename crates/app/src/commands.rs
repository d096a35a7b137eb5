use anyhow::Result;
use services::{CollectionWorker, ImportOptions};
use shared::collection::format_size;
use shared::settings::CollectionSettings;
use shared::{CollectionUpdate, FileCollection, FileCollectionItem, NewCollection};
use uuid::Uuid;

use crate::Commands;

/// Look a collection up by id, falling back to its exact name.
fn resolve(worker: &CollectionWorker, key: &str) -> Result<FileCollection> {
    let key = key.to_string();
    let collection = worker.run(move |service| async move {
        match Uuid::parse_str(&key) {
            Ok(id) => service.get_collection(id).await,
            Err(_) => service.get_collection_by_name(&key).await,
        }
    })?;
    Ok(collection)
}

fn print_collections(collections: &[FileCollection], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(collections)?);
        return Ok(());
    }
    if collections.is_empty() {
        println!("No collections");
    }
    for c in collections {
        let marker = if c.is_template { " [template]" } else { "" };
        println!(
            "{}  {}{}  {} files, {} of {}MB",
            c.id,
            c.name,
            marker,
            c.file_count,
            c.formatted_size(),
            c.max_size_mb
        );
    }
    Ok(())
}

fn print_files(files: &[FileCollectionItem]) {
    for f in files {
        println!(
            "  {}  {}  {}  {}",
            f.id,
            f.file_name,
            f.formatted_size(),
            f.file_path.display()
        );
    }
}

pub fn execute(
    worker: &CollectionWorker,
    settings: &CollectionSettings,
    json: bool,
    command: Commands,
) -> Result<()> {
    match command {
        Commands::Create {
            name,
            description,
            tags,
            chunk_size,
            chunk_overlap,
            max_size_mb,
            template,
        } => {
            let new = NewCollection::new(name)
                .with_description(description.unwrap_or_default())
                .with_tags(tags)
                .with_chunking(
                    chunk_size.unwrap_or(settings.default_chunk_size),
                    chunk_overlap.unwrap_or(settings.default_chunk_overlap),
                )
                .with_max_size_mb(max_size_mb.unwrap_or(settings.default_max_size_mb))
                .as_template(template);
            let collection =
                worker.run(move |service| async move { service.create_collection(new).await })?;
            println!("Created collection {} ({})", collection.name, collection.id);
        }
        Commands::List { templates, tags } => {
            let collections = worker
                .run(move |service| async move { service.list_collections(templates, &tags).await })?;
            print_collections(&collections, json)?;
        }
        Commands::Show { collection } => {
            let collection = resolve(worker, &collection)?;
            let id = collection.id;
            let files =
                worker.run(move |service| async move { service.get_collection_files(id).await })?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "collection": collection,
                        "files": files,
                    }))?
                );
                return Ok(());
            }
            println!("{} ({})", collection.name, collection.id);
            if !collection.description.is_empty() {
                println!("  {}", collection.description);
            }
            if !collection.tags.is_empty() {
                println!("  tags: {}", collection.tags.join(", "));
            }
            println!(
                "  chunking: {} / {} overlap",
                collection.chunk_size, collection.chunk_overlap
            );
            println!(
                "  size: {} of {}MB, {} remaining",
                collection.formatted_size(),
                collection.max_size_mb,
                format_size(collection.remaining_bytes())
            );
            print_files(&files);
        }
        Commands::Update {
            collection,
            name,
            description,
            tags,
            chunk_size,
            chunk_overlap,
            max_size_mb,
        } => {
            let update = CollectionUpdate {
                name,
                description,
                tags,
                chunk_size,
                chunk_overlap,
                max_size_mb,
            };
            if update.is_empty() {
                println!("Nothing to update");
                return Ok(());
            }
            let id = resolve(worker, &collection)?.id;
            let updated = worker
                .run(move |service| async move { service.update_collection(id, update).await })?;
            println!("Updated collection {}", updated.name);
        }
        Commands::Delete { collection } => {
            let collection = resolve(worker, &collection)?;
            let id = collection.id;
            worker.run(move |service| async move { service.delete_collection(id).await })?;
            println!("Deleted collection {}", collection.name);
        }
        Commands::Add {
            collection,
            files,
            no_duplicate_check,
        } => {
            let id = resolve(worker, &collection)?.id;
            let check_duplicates = settings.check_duplicates && !no_duplicate_check;
            let report = worker.run(move |service| async move {
                Ok(service
                    .add_files_to_collection(id, &files, check_duplicates)
                    .await)
            })?;
            for added in &report.added {
                println!("Added {} ({})", added.item.file_name, added.item.formatted_size());
                if let Some(existing) = &added.duplicate_of {
                    println!(
                        "  same content as {} in collection {}",
                        existing.file_name, existing.collection_id
                    );
                }
            }
            for message in report.error_messages() {
                eprintln!("{}", message);
            }
            println!(
                "{} added, {} failed",
                report.success_count(),
                report.errors.len()
            );
        }
        Commands::Remove {
            collection,
            file_id,
        } => {
            let id = resolve(worker, &collection)?.id;
            worker.run(move |service| async move {
                service.remove_file_from_collection(id, file_id).await
            })?;
            println!("Removed {}", file_id);
        }
        Commands::Verify { collection, file } => {
            let id = resolve(worker, &collection)?.id;
            match file {
                Some(file_id) => {
                    let status = worker.run(move |service| async move {
                        service.verify_file_integrity(id, file_id).await
                    })?;
                    println!("{}", status);
                }
                None => {
                    let integrity = worker
                        .run(move |service| async move { service.verify_collection_integrity(id).await })?;
                    for message in integrity.error_messages() {
                        println!("{}", message);
                    }
                    println!(
                        "{} checked, {} valid",
                        integrity.checked,
                        integrity.checked - integrity.failures.len()
                    );
                }
            }
        }
        Commands::Templates => {
            let templates = worker.service().get_builtin_templates();
            if json {
                println!("{}", serde_json::to_string_pretty(templates)?);
                return Ok(());
            }
            for t in templates {
                println!(
                    "{}: {} (chunks {}/{}, {}MB, patterns {})",
                    t.name,
                    t.description,
                    t.chunk_size,
                    t.chunk_overlap,
                    t.max_size_mb,
                    t.file_patterns.join(" ")
                );
            }
        }
        Commands::Instantiate {
            template,
            name,
            files,
        } => {
            let instance = worker.run(move |service| async move {
                service.instantiate_template(&template, &name, &files).await
            })?;
            for message in instance.files.error_messages() {
                eprintln!("{}", message);
            }
            println!(
                "Created {} with {} files",
                instance.collection.name, instance.collection.file_count
            );
        }
        Commands::Export {
            collection,
            output,
            no_files,
        } => {
            let id = resolve(worker, &collection)?.id;
            let summary = worker.run(move |service| async move {
                service.export_collection(id, &output, !no_files).await
            })?;
            for name in &summary.skipped {
                eprintln!("Skipped missing file {}", name);
            }
            println!(
                "Exported {} files to {}",
                summary.files_included,
                summary.archive_path.display()
            );
        }
        Commands::Import {
            archive,
            name,
            restore_to,
        } => {
            let mut options = ImportOptions::default();
            if let Some(name) = name {
                options = options.with_name(name);
            }
            if let Some(target) = restore_to {
                options = options.restore_to(target);
            }
            let report = worker.run(move |service| async move {
                service.import_collection(&archive, options).await
            })?;
            for warning in &report.warnings {
                eprintln!("warning: {}", warning);
            }
            println!(
                "Imported {} ({} files restored)",
                report.collection.name, report.files_restored
            );
        }
        Commands::Attach {
            conversation,
            collection,
        } => {
            let id = resolve(worker, &collection)?.id;
            let attached = worker.run(move |service| async move {
                service.attach_to_conversation(&conversation, id).await
            })?;
            println!("{}", if attached { "Attached" } else { "Already attached" });
        }
        Commands::Detach {
            conversation,
            collection,
        } => {
            let id = resolve(worker, &collection)?.id;
            let detached = worker.run(move |service| async move {
                service.detach_from_conversation(&conversation, id).await
            })?;
            println!("{}", if detached { "Detached" } else { "Not attached" });
        }
        Commands::Conversation { conversation } => {
            let collections = worker.run(move |service| async move {
                service.get_conversation_collections(&conversation).await
            })?;
            print_collections(&collections, json)?;
        }
        Commands::Search { query, tags } => {
            let collections = worker
                .run(move |service| async move { service.search_collections(&query, &tags).await })?;
            print_collections(&collections, json)?;
        }
        Commands::Duplicates => {
            let groups = worker.run(|service| async move { service.find_duplicate_files().await })?;
            if groups.is_empty() {
                println!("No duplicate content");
            }
            for group in groups {
                println!("{}", group.checksum);
                print_files(&group.items);
            }
        }
    }
    Ok(())
}

