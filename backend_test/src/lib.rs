use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, spanned::Spanned, FnArg, Ident, ItemFn, Pat, Signature, Type};

/// What a test runs against, chosen by the attribute argument.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// A fresh in-memory store, no caller identity.
    Anonymous,
    /// A fresh in-memory store, authenticated as the administrator.
    Admin,
    /// A fresh in-memory store, authenticated as a verified student.
    Student,
    /// A live MongoDB database, dropped after the test.
    Mongodb,
}

impl Mode {
    fn parse(arg: Option<Ident>) -> Result<Self, syn::Error> {
        let Some(arg) = arg else {
            return Ok(Self::Anonymous);
        };
        if arg == "admin" {
            Ok(Self::Admin)
        } else if arg == "student" {
            Ok(Self::Student)
        } else if arg == "mongodb" {
            Ok(Self::Mongodb)
        } else {
            Err(syn::Error::new(
                arg.span(),
                "Expected one of `admin`, `student` or `mongodb`",
            ))
        }
    }
}

/// Transform an asynchronous test into a synchronous one, inject dependencies,
/// and ensure that any database is dropped regardless of how the test
/// terminates.
///
/// Injectable dependencies are [`rocket::local::asynchronous::Client`], the
/// store the client runs on (`MemoryStore`, or `MongoStore` with
/// `#[backend_test(mongodb)]`), [`mongodb::Database`] (MongoDB only), and,
/// with `#[backend_test(admin)]` or `#[backend_test(student)]`, the
/// `rocket::http::Header` carrying the caller's identity token.
#[proc_macro_attribute]
pub fn backend_test(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);
    let mode = match Mode::parse(parse_macro_input!(args as Option<Ident>)) {
        Ok(mode) => mode,
        Err(err) => return err.into_compile_error().into(),
    };

    // Extract the arguments to inject and reject invalid function signatures.
    let test_args = match check_sig(item_fn.sig.clone(), mode) {
        Ok(args) => args,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Rename the future so the test can have its original name, and move
    // attributes such as `#[ignore]` onto the generated test.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();
    let attrs = std::mem::take(&mut item_fn.attrs);

    let setup = setup(mode, &name);
    let cleanup = if mode == Mode::Mongodb {
        quote! { cleanup_db.drop(None).await.unwrap(); }
    } else {
        quote! {}
    };
    let keep_db = if mode == Mode::Mongodb {
        quote! { let cleanup_db = db.clone(); }
    } else {
        quote! {}
    };

    // Rewrite the test function.
    quote! {
        #(#attrs)*
        #[test]
        fn #name() {
            /// The test itself.
            #item_fn

            log4rs_test_utils::test_logging::init_logging_once_for(["campus_vote"], None, None);

            // Create an async runtime. We need a separate one for inside and
            // outside the `catch_unwind`.
            let outer_runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("test-setup-cleanup")
                .worker_threads(1)
                .enable_all()
                .build()
                .unwrap();
            let inner_runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("rocket-worker-test-thread")
                .worker_threads(1)
                .enable_all()
                .build()
                .unwrap();

            // Run the setup.
            let (rocket_client, store, db, auth) = outer_runtime.block_on(async { #setup });
            #keep_db

            // Run the test, catching any panics.
            // Use mutexes to safely transfer `!UnwindSafe` data.
            let state_mutex = std::sync::Mutex::new((rocket_client, store, db, auth));
            let runtime_mutex = std::sync::Mutex::new(inner_runtime);
            let result = std::panic::catch_unwind(|| {
                #[allow(unused_variables)]
                let (rocket_client, store, db, auth) = state_mutex.into_inner().unwrap();
                let runtime = runtime_mutex.into_inner().unwrap();
                runtime.block_on(#new_name(#(#test_args),*));
            });

            // Run the cleanup.
            outer_runtime.block_on(async { #cleanup });

            // If the test panicked, re-raise the panic.
            if let Err(cause) = result {
                std::panic::panic_any(cause);
            }
        }
    }
    .into()
}

/// Build the setup block, evaluating to `(rocket_client, store, db, auth)`.
fn setup(mode: Mode, name: &Ident) -> TokenStream2 {
    let store = if mode == Mode::Mongodb {
        quote! {
            let db_uri = std::env::var("CAMPUS_VOTE_TEST_DB_URI")
                .unwrap_or_else(|_| "mongodb://localhost:27017/?replicaSet=rs0".to_string());
            let db_name = format!("campus_vote_test_{}", stringify!(#name));
            let store = crate::store::MongoStore::connect(&db_uri, &db_name).await.unwrap();
            let db = store.database().clone();
        }
    } else {
        quote! {
            let store = crate::store::MemoryStore::new();
            let db = ();
        }
    };

    let login = match mode {
        Mode::Admin => quote! {
            let config = rocket_client.rocket().state::<crate::config::Config>().unwrap();
            let user = crate::store::Store::user_by_matric(&store, crate::model::user::DEFAULT_ADMIN_MATRIC)
                .await
                .unwrap()
                .unwrap();
            let token = crate::model::auth::AuthToken::<crate::model::auth::Admin>::new(&user);
            Some(rocket::http::Header::new("Authorization", format!("Bearer {}", token.encode(config))))
        },
        Mode::Student => quote! {
            let config = rocket_client.rocket().state::<crate::config::Config>().unwrap();
            let id = crate::store::Store::next_id(&store, crate::model::common::IdKind::User)
                .await
                .unwrap();
            let user = crate::model::user::User::student_example(id);
            crate::store::Store::insert_user(&store, &user).await.unwrap();
            let token = crate::model::auth::AuthToken::<crate::model::auth::Student>::new(&user);
            Some(rocket::http::Header::new("Authorization", format!("Bearer {}", token.encode(config))))
        },
        Mode::Anonymous | Mode::Mongodb => quote! {
            None::<rocket::http::Header<'static>>
        },
    };

    quote! {
        #store
        let rocket_client = rocket::local::asynchronous::Client::tracked(crate::rocket_for_store(store.clone()))
            .await
            .unwrap();
        let auth = { #login };
        (rocket_client, store, db, auth)
    }
}

/// Ensure the wrapped test is async, extract parameters to inject, and reject unknown parameters.
fn check_sig(sig: Signature, mode: Mode) -> Result<Vec<TokenStream2>, syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut seen: Vec<&'static str> = vec![];
    let mut args = vec![];

    for input in &sig.inputs {
        let injected = match input {
            FnArg::Typed(pat_type) => match (&*pat_type.pat, &*pat_type.ty) {
                // Valid as the last path segment for any type is itself.
                (Pat::Ident(_), Type::Path(type_path)) => type_path
                    .path
                    .segments
                    .last()
                    .map(|segment| segment.ident.to_string()),
                _ => None,
            },
            FnArg::Receiver(_) => None,
        };

        let (key, arg) = match injected.as_deref() {
            Some("Client") => ("Client", quote! { rocket_client }),
            Some("MemoryStore") if mode != Mode::Mongodb => ("store", quote! { store }),
            Some("MongoStore") if mode == Mode::Mongodb => ("store", quote! { store }),
            Some("Database") if mode == Mode::Mongodb => ("Database", quote! { db }),
            Some("Header") if matches!(mode, Mode::Admin | Mode::Student) => {
                ("Header", quote! { auth.clone().unwrap() })
            }
            _ => {
                return Err(syn::Error::new(
                    input.span(),
                    "Expected one of `client: Client`, `store: MemoryStore`, `store: MongoStore` \
                     and `db: Database` with `(mongodb)`, or `auth: Header<'static>` with \
                     `(admin)` or `(student)`",
                ))
            }
        };

        if seen.contains(&key) {
            return Err(syn::Error::new(
                input.span(),
                format!("Test cannot accept more than one `{key}`"),
            ));
        }
        seen.push(key);
        args.push(arg);
    }

    Ok(args)
}
